//! The `disasm` pipeline
//!
//! Unpacks an ELF program binary into a dump directory: the build options
//! and IR sections as side files, the per kernel heaps as raw blobs and the
//! patch token structure as the line oriented `PTM.txt` rendering that
//! [`asm`](crate::asm) can turn back into bytes.

use crate::iga::{GenAssembler, IgaStub};
use crate::schema::{Field, Schema};
use crate::CodecError;
use oclelf::{sh_type, Elf};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

fn u32_at(data: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([data[off], data[off + 1], data[off + 2], data[off + 3]])
}

fn invalid(msg: impl Into<String>) -> CodecError {
    CodecError::InvalidBinary(msg.into())
}

/// Drives ELF unpacking and PTM rendering
pub struct Disassembler {
    binary_file: PathBuf,
    path_to_dump: PathBuf,
    schema: Schema,
    iga: Box<dyn GenAssembler>,
}

impl Disassembler {
    /// Creates a disassembler for `binary_file`, dumping into
    /// `path_to_dump`; the schema is parsed from `path_to_patch` when given
    pub fn new(
        binary_file: impl Into<PathBuf>,
        path_to_patch: Option<&Path>,
        path_to_dump: impl Into<PathBuf>,
    ) -> Result<Self, CodecError> {
        let schema = match path_to_patch {
            Some(dir) => Schema::from_patch_dir(dir)?,
            None => {
                warn!(
                    "Path to patch list not provided - using defaults, \
                     skipping patchtokens as undefined"
                );
                Schema::builtin()
            }
        };
        Ok(Self {
            binary_file: binary_file.into(),
            path_to_dump: path_to_dump.into(),
            schema,
            iga: Box::new(IgaStub::new()),
        })
    }

    /// Replaces the ISA backend (used to emit `.asm` side files)
    pub fn with_assembler(mut self, iga: Box<dyn GenAssembler>) -> Self {
        self.iga = iga;
        self
    }

    /// Runs the pipeline
    pub fn decode(&self) -> Result<(), CodecError> {
        std::fs::create_dir_all(&self.path_to_dump)
            .map_err(|e| CodecError::io(&self.path_to_dump, e))?;
        let binary = std::fs::read(&self.binary_file)
            .map_err(|e| CodecError::io(&self.binary_file, e))?;
        let elf = Elf::parse(&binary).map_err(|e| invalid(e.to_string()))?;

        let mut device_binary = None;
        for section in &elf.sections {
            match section.sh_type {
                sh_type::OPENCL_LLVM_BINARY => {
                    self.write_dump("llvm.bin", elf.section_data(section))?;
                }
                sh_type::SPIRV => {
                    self.write_dump("spirv.bin", elf.section_data(section))?;
                }
                sh_type::OPENCL_OPTIONS => {
                    self.write_dump("build.bin", elf.section_data(section))?;
                }
                sh_type::OPENCL_DEV_BINARY => {
                    device_binary = Some(elf.section_data(section));
                }
                _ => {}
            }
        }
        let device_binary =
            device_binary.ok_or_else(|| invalid("Device Binary section was not found"))?;

        let ptm = self.process_binary(device_binary)?;
        self.write_dump("PTM.txt", ptm.as_bytes())?;
        info!("Dumped {} into {}", self.binary_file.display(), self.path_to_dump.display());
        Ok(())
    }

    /// Renders the whole device binary blob to PTM text, dumping the kernel
    /// heaps on the way
    pub fn process_binary(&self, dev: &[u8]) -> Result<String, CodecError> {
        let mut ptm = String::new();
        let mut pos = 0usize;

        ptm.push_str("ProgramBinaryHeader:\n");
        let mut number_of_kernels = 0u32;
        let mut patch_list_size = 0u32;
        for field in &self.schema.program_header.fields {
            let value = dump_field(dev, &mut pos, field, &mut ptm)?;
            match field.name.as_str() {
                "NumberOfKernels" => number_of_kernels = value as u32,
                "PatchListSize" => patch_list_size = value as u32,
                _ => {}
            }
        }
        if number_of_kernels == 0 {
            warn!("Number of Kernels is 0");
        }

        self.read_patch_tokens(dev, &mut pos, patch_list_size, &mut ptm)?;

        for i in 0..number_of_kernels {
            let _ = writeln!(ptm, "Kernel #{}", i);
            self.process_kernel(dev, &mut pos, &mut ptm)?;
        }
        Ok(ptm)
    }

    fn process_kernel(
        &self,
        dev: &[u8],
        pos: &mut usize,
        ptm: &mut String,
    ) -> Result<(), CodecError> {
        let mut kernel_name_size = 0u32;
        let mut kernel_patch_list_size = 0u32;
        let mut kernel_heap_size = 0u32;
        let mut general_state_heap_size = 0u32;
        let mut dynamic_state_heap_size = 0u32;
        let mut surface_state_heap_size = 0u32;

        ptm.push_str("KernelBinaryHeader:\n");
        for field in &self.schema.kernel_header.fields {
            let value = dump_field(dev, pos, field, ptm)?;
            match field.name.as_str() {
                "KernelNameSize" => kernel_name_size = value as u32,
                "PatchListSize" => kernel_patch_list_size = value as u32,
                "KernelHeapSize" => kernel_heap_size = value as u32,
                "GeneralStateHeapSize" => general_state_heap_size = value as u32,
                "DynamicStateHeapSize" => dynamic_state_heap_size = value as u32,
                "SurfaceStateHeapSize" => surface_state_heap_size = value as u32,
                _ => {}
            }
        }

        if kernel_name_size == 0 {
            return Err(invalid("KernelNameSize was 0"));
        }

        let name_bytes = cut(dev, pos, kernel_name_size as usize, "kernel name")?;
        let nul = name_bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(name_bytes.len());
        let kernel_name = String::from_utf8_lossy(&name_bytes[..nul]).into_owned();
        let _ = writeln!(ptm, "\tKernelName {}", kernel_name);

        let isa = cut(dev, pos, kernel_heap_size as usize, "kernel heap")?;
        self.write_dump(&format!("{}_KernelHeap.bin", kernel_name), isa)?;
        match self.iga.try_disassemble(isa) {
            Some(text) => {
                self.write_dump(&format!("{}_KernelHeap.asm", kernel_name), text.as_bytes())?
            }
            // keep a raw copy around so reassembly has an ISA source
            None => self.write_dump(&format!("{}_KernelHeap.dat", kernel_name), isa)?,
        }

        if general_state_heap_size != 0 {
            warn!("GeneralStateHeapSize wasn't 0");
            let heap = cut(dev, pos, general_state_heap_size as usize, "general state heap")?;
            self.write_dump(&format!("{}_GeneralStateHeap.bin", kernel_name), heap)?;
        }

        let heap = cut(dev, pos, dynamic_state_heap_size as usize, "dynamic state heap")?;
        self.write_dump(&format!("{}_DynamicStateHeap.bin", kernel_name), heap)?;

        let heap = cut(dev, pos, surface_state_heap_size as usize, "surface state heap")?;
        self.write_dump(&format!("{}_SurfaceStateHeap.bin", kernel_name), heap)?;

        if kernel_patch_list_size == 0 {
            warn!("Kernel's patch list size was 0");
        }
        self.read_patch_tokens(dev, pos, kernel_patch_list_size, ptm)
    }

    /// Renders one patch list: known tokens field by field, everything else
    /// (unknown tokens, trailing record bytes, inline data) as `Hex` lines
    fn read_patch_tokens(
        &self,
        dev: &[u8],
        pos: &mut usize,
        patch_list_size: u32,
        ptm: &mut String,
    ) -> Result<(), CodecError> {
        let list = cut(dev, pos, patch_list_size as usize, "patch list")?;
        let mut at = 0usize;
        while at < list.len() {
            if list.len() - at < 8 {
                return Err(invalid("Truncated patch token header"));
            }
            let token = u32_at(list, at);
            let size = u32_at(list, at + 4) as usize;
            if size == 0 {
                return Err(invalid("Patch token with zero size"));
            }
            if size > list.len() - at {
                return Err(invalid("Patch token size exceeds the patch list"));
            }

            let desc = self.schema.patch_tokens.get(&token);
            match desc {
                Some(desc) => {
                    ptm.push_str(&desc.name);
                    ptm.push_str(":\n");
                }
                None => ptm.push_str("Unidentified PatchToken:\n"),
            }
            let _ = writeln!(ptm, "\t4 Token {}", token);
            let _ = writeln!(ptm, "\t4 Size {}", size);

            let mut field_at = at + 8;
            let mut inline_len = 0usize;
            if let Some(desc) = desc {
                let budget = size.saturating_sub(8) as u32;
                let mut fields_size = 0u32;
                for field in &desc.fields {
                    fields_size += u32::from(field.size);
                    if fields_size > budget {
                        break;
                    }
                    // inline data trails the record without counting into
                    // its declared size
                    if field.name == "InlineDataSize" {
                        if list.len() - field_at < 4 {
                            return Err(invalid("Truncated InlineDataSize field"));
                        }
                        inline_len = u32_at(list, field_at) as usize;
                        if inline_len > list.len() - at - size {
                            return Err(invalid("Inline data exceeds the patch list"));
                        }
                    }
                    dump_field(list, &mut field_at, field, ptm)?;
                }
            }

            let total = size + inline_len;
            if at + total > field_at {
                ptm.push_str("\tHex");
                for byte in &list[field_at..at + total] {
                    let _ = write!(ptm, " {:x}", byte);
                }
                ptm.push('\n');
            }
            at += total;
        }
        Ok(())
    }

    fn write_dump(&self, name: &str, data: &[u8]) -> Result<(), CodecError> {
        let path = self.path_to_dump.join(name);
        std::fs::write(&path, data).map_err(|e| CodecError::io(&path, e))
    }
}

fn cut<'a>(data: &'a [u8], pos: &mut usize, len: usize, what: &str) -> Result<&'a [u8], CodecError> {
    if data.len() - *pos < len {
        return Err(invalid(format!("Truncated {}", what)));
    }
    let piece = &data[*pos..*pos + len];
    *pos += len;
    Ok(piece)
}

/// Renders one field as `<tab><size> <name> <value>` and returns the value
fn dump_field(
    data: &[u8],
    pos: &mut usize,
    field: &Field,
    ptm: &mut String,
) -> Result<u64, CodecError> {
    let bytes = cut(data, pos, usize::from(field.size), "field")?;
    let value = match field.size {
        1 => u64::from(bytes[0]),
        2 => u64::from(u16::from_le_bytes([bytes[0], bytes[1]])),
        4 => u64::from(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        8 => u64::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]),
        _ => return Err(CodecError::Internal("Unknown size".to_string())),
    };
    let _ = writeln!(ptm, "\t{} {} {}", field.size, field.name, value);
    Ok(value)
}
