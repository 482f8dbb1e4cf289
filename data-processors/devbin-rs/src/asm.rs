//! The `asm` pipeline
//!
//! Reassembles a dump directory (as produced by [`disasm`](crate::disasm))
//! into an ELF program binary: patch list sizes are recomputed from the PTM
//! text, kernel heaps are assembled or copied, ISA prefetch padding is
//! applied and every kernel checksum is recalculated from the rebuilt blob.

use crate::iga::{GenAssembler, IgaStub};
use crate::CodecError;
use byteorder::{WriteBytesExt, LE};
use oclelf::{eh_type, sh_type, writer::ElfWriter};
use oclutils::hash;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

// the compiler pads every kernel heap for instruction prefetch; reassembly
// has to do the same
const ISA_PADDING_SIZE: u32 = 128;
const KERNEL_HEAP_ALIGNMENT: u32 = 64;

fn align_up(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}

fn internal(msg: impl Into<String>) -> CodecError {
    CodecError::Internal(msg.into())
}

/// Parses the run of leading decimal digits, 0 when there is none
fn leading_number(text: &str) -> u32 {
    let digits: String = text.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

/// Returns the third whitespace separated word of a field line as a number
fn field_value(line: &str) -> Option<u64> {
    line.split_whitespace().nth(2).and_then(|w| w.parse().ok())
}

/// Rewrites every stale `PatchListSize` value in place
///
/// When a named token section follows, the actual list size is recomputed
/// by summing the field widths and `Hex` byte counts up to the next
/// `Kernel #` marker; a differing stored value is replaced with a warning.
pub fn calculate_patch_list_sizes(lines: &mut [String]) {
    let mut patch_list_pos = 0usize;
    let mut i = 0usize;
    while i < lines.len() {
        if lines[i].contains("PatchListSize") {
            patch_list_pos = i;
        } else if lines[i].contains("PATCH_TOKEN") {
            let mut calc_size = 0u32;
            i += 1;
            while i < lines.len() && !lines[i].contains("Kernel #") {
                let line = &lines[i];
                if !line.contains(':') && !line.is_empty() {
                    if line.contains("Hex") {
                        // one byte per space
                        calc_size += line.matches(' ').count() as u32;
                    } else {
                        calc_size += leading_number(&line[1..]);
                    }
                }
                i += 1;
            }
            let stored_at = match lines[patch_list_pos].rfind(' ') {
                Some(p) => p + 1,
                None => continue,
            };
            let stored: u32 = lines[patch_list_pos][stored_at..].parse().unwrap_or(0);
            if stored != calc_size {
                warn!(
                    "Calculated PatchListSize ( {} ) differs from file ( {} ) - changing it. Line {}",
                    calc_size,
                    stored,
                    patch_list_pos + 1
                );
                let mut rewritten = lines[patch_list_pos][..stored_at].to_string();
                rewritten.push_str(&calc_size.to_string());
                lines[patch_list_pos] = rewritten;
            }
        }
        i += 1;
    }
}

/// Emits the bytes a single PTM line stands for
///
/// Section header lines (containing `:`) emit nothing, `Hex` lines emit
/// their bytes verbatim and field lines emit their value as a little endian
/// integer of the declared width; values outside the width truncate.
pub fn write_device_binary(line: &str, out: &mut Vec<u8>) -> Result<(), CodecError> {
    if line.contains(':') {
        return Ok(());
    }
    if line.contains("Hex") {
        for word in line.split_whitespace().skip(1) {
            let byte = u16::from_str_radix(word, 16)
                .map_err(|_| internal(format!("Invalid hex byte in line: {}", line)))?;
            out.push(byte as u8);
        }
        return Ok(());
    }
    let mut words = line.split_whitespace();
    let size: u16 = words
        .next()
        .and_then(|w| w.parse().ok())
        .ok_or_else(|| internal(format!("Unknown size in line: {}", line)))?;
    let _name = words.next();
    let value: u64 = words.next().and_then(|w| w.parse().ok()).unwrap_or(0);
    match size {
        1 => out.push(value as u8),
        2 => out
            .write_u16::<LE>(value as u16)
            .expect("writing into a Vec cannot fail"),
        4 => out
            .write_u32::<LE>(value as u32)
            .expect("writing into a Vec cannot fail"),
        8 => out
            .write_u64::<LE>(value)
            .expect("writing into a Vec cannot fail"),
        _ => return Err(internal(format!("Unknown size in line: {}", line))),
    }
    Ok(())
}

/// Drives PTM reassembly and ELF packaging
pub struct Encoder {
    path_to_dump: PathBuf,
    elf_name: PathBuf,
    ignore_isa_padding: bool,
    iga: Box<dyn GenAssembler>,
}

impl Encoder {
    /// Creates an encoder reading the dump at `path_to_dump` and writing
    /// the container to `elf_name`
    pub fn new(path_to_dump: impl Into<PathBuf>, elf_name: impl Into<PathBuf>) -> Self {
        Self {
            path_to_dump: path_to_dump.into(),
            elf_name: elf_name.into(),
            ignore_isa_padding: false,
            iga: Box::new(IgaStub::new()),
        }
    }

    /// Disables the 128 byte prefetch padding and 64 byte alignment
    pub fn ignore_isa_padding(mut self, ignore: bool) -> Self {
        self.ignore_isa_padding = ignore;
        self
    }

    /// Replaces the ISA backend
    pub fn with_assembler(mut self, iga: Box<dyn GenAssembler>) -> Self {
        self.iga = iga;
        self
    }

    /// Selects the target device by name; [false] for unknown names
    pub fn set_device(&mut self, device: &str) -> bool {
        self.iga.set_product_family(device)
    }

    /// Runs the pipeline
    pub fn encode(&mut self) -> Result<(), CodecError> {
        let ptm_path = self.path_to_dump.join("PTM.txt");
        let text = std::fs::read_to_string(&ptm_path).map_err(|e| CodecError::io(&ptm_path, e))?;
        let mut lines: Vec<String> = text.lines().map(String::from).collect();
        calculate_patch_list_sizes(&mut lines);

        let device_binary = self.process_binary(&lines)?;
        let dev_path = self.path_to_dump.join("device_binary.bin");
        std::fs::write(&dev_path, &device_binary).map_err(|e| CodecError::io(&dev_path, e))?;

        let elf = self.create_elf()?;
        std::fs::write(&self.elf_name, elf).map_err(|e| CodecError::io(&self.elf_name, e))?;
        info!("Assembled {}", self.elf_name.display());
        Ok(())
    }

    /// Reassembles the device binary blob out of the PTM lines
    pub fn process_binary(&mut self, lines: &[String]) -> Result<Vec<u8>, CodecError> {
        if !self.iga.is_known_platform() {
            // fall back to the gfx core recorded in the program header
            if let Some(device_line) = lines.iter().find(|l| l.contains("Device")) {
                if let Some(value) = field_value(device_line) {
                    self.iga.set_gfx_core(value as u32);
                }
            }
        }

        let mut out = Vec::new();
        let mut i = 0usize;
        while i < lines.len() {
            if lines[i].contains("Kernel #") {
                i += 1;
                self.process_kernel(&mut i, lines, &mut out)?;
            } else {
                write_device_binary(&lines[i], &mut out)?;
                i += 1;
            }
        }
        Ok(out)
    }

    fn process_kernel(
        &self,
        i: &mut usize,
        lines: &[String],
        out: &mut Vec<u8>,
    ) -> Result<(), CodecError> {
        let info_begin = *i;
        let mut info_end = lines.len();
        let mut name_marker = lines.len();
        let mut patchtokens_marker = lines.len();
        let mut kernel_name_size = 0usize;
        let mut kernel_name = String::new();

        while *i < lines.len() {
            let line = &lines[*i];
            if line.contains("KernelName ") {
                kernel_name = match line.find(' ') {
                    Some(p) => line[p + 1..].to_string(),
                    None => String::new(),
                };
                name_marker = *i;
                patchtokens_marker = name_marker + 1; // patchtokens come after the name
            } else if line.contains("KernelNameSize") {
                kernel_name_size = field_value(line).unwrap_or(0) as usize;
            } else if line.contains("Kernel #") {
                info_end = *i;
                break;
            }
            *i += 1;
        }
        if name_marker == lines.len() {
            return Err(internal("Kernel block carries no KernelName"));
        }

        // name plus NUL padding up to the declared size
        let mut blob: Vec<u8> = Vec::new();
        blob.extend_from_slice(kernel_name.as_bytes());
        blob.resize(
            blob.len() + kernel_name_size.saturating_sub(kernel_name.len()),
            0,
        );

        // the ISA heap comes from the assembler when a source exists,
        // verbatim from the raw dump otherwise
        let asm_path = self.dump_file(&format!("{}_KernelHeap.asm", kernel_name));
        let unpadded_size: u32;
        if asm_path.exists() {
            let source =
                std::fs::read_to_string(&asm_path).map_err(|e| CodecError::io(&asm_path, e))?;
            info!("Trying to assemble {}.asm", kernel_name);
            let isa = self
                .iga
                .try_assemble(&source)
                .ok_or_else(|| internal(format!("Could not assemble: {}", kernel_name)))?;
            unpadded_size = isa.len() as u32;
            blob.extend_from_slice(&isa);
        } else {
            let dat_path = self.dump_file(&format!("{}_KernelHeap.dat", kernel_name));
            let isa = std::fs::read(&dat_path).map_err(|e| CodecError::io(&dat_path, e))?;
            unpadded_size = isa.len() as u32;
            blob.extend_from_slice(&isa);
        }

        let kernel_heap_size = if self.ignore_isa_padding {
            unpadded_size
        } else {
            let padded = unpadded_size + ISA_PADDING_SIZE;
            let aligned = align_up(padded, KERNEL_HEAP_ALIGNMENT);
            blob.resize(blob.len() + (aligned - unpadded_size) as usize, 0);
            aligned
        };

        let general = self.dump_file(&format!("{}_GeneralStateHeap.bin", kernel_name));
        if general.exists() {
            blob.extend_from_slice(&std::fs::read(&general).map_err(|e| CodecError::io(&general, e))?);
        }
        for heap in ["DynamicStateHeap", "SurfaceStateHeap"] {
            let path = self.dump_file(&format!("{}_{}.bin", kernel_name, heap));
            blob.extend_from_slice(&std::fs::read(&path).map_err(|e| CodecError::io(&path, e))?);
        }

        for line in &lines[patchtokens_marker.min(info_end)..info_end] {
            write_device_binary(line, &mut blob)?;
        }

        let checksum = hash::checksum(&blob);

        // the header precedes the blob; computed values replace the stored
        // checksum and heap sizes
        for line in &lines[info_begin..name_marker] {
            if line.contains("CheckSum") {
                out.write_u32::<LE>(checksum)
                    .expect("writing into a Vec cannot fail");
            } else if line.contains("KernelHeapSize") {
                out.write_u32::<LE>(kernel_heap_size)
                    .expect("writing into a Vec cannot fail");
            } else if line.contains("KernelUnpaddedSize") {
                out.write_u32::<LE>(unpadded_size)
                    .expect("writing into a Vec cannot fail");
            } else {
                write_device_binary(line, out)?;
            }
        }
        out.extend_from_slice(&blob);
        Ok(())
    }

    fn create_elf(&self) -> Result<Vec<u8>, CodecError> {
        let mut writer = ElfWriter::new(eh_type::OPENCL_EXECUTABLE, 0, 0);

        let build = self.dump_file("build.bin");
        if build.exists() {
            let data = std::fs::read(&build).map_err(|e| CodecError::io(&build, e))?;
            writer.add_section(sh_type::OPENCL_OPTIONS, 0, "BuildOptions", &data);
        } else {
            warn!("Missing build section");
        }

        let llvm = self.dump_file("llvm.bin");
        let spirv = self.dump_file("spirv.bin");
        if llvm.exists() {
            let data = std::fs::read(&llvm).map_err(|e| CodecError::io(&llvm, e))?;
            writer.add_section(
                sh_type::OPENCL_LLVM_BINARY,
                0,
                "Intel(R) OpenCL LLVM Object",
                &data,
            );
        } else if spirv.exists() {
            let data = std::fs::read(&spirv).map_err(|e| CodecError::io(&spirv, e))?;
            writer.add_section(sh_type::SPIRV, 0, "SPIRV Object", &data);
        } else {
            warn!("Missing llvm/spirv section");
        }

        let dev = self.dump_file("device_binary.bin");
        let data = std::fs::read(&dev).map_err(|e| CodecError::io(&dev, e))?;
        writer.add_section(
            sh_type::OPENCL_DEV_BINARY,
            0,
            "Intel(R) OpenCL Device Binary",
            &data,
        );

        Ok(writer.encode())
    }

    fn dump_file(&self, name: &str) -> PathBuf {
        self.path_to_dump.join(name)
    }

    /// The dump directory this encoder reads from
    pub fn path_to_dump(&self) -> &Path {
        &self.path_to_dump
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn lines(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn align() {
        assert_eq!(align_up(0, 64), 0);
        assert_eq!(align_up(1, 64), 64);
        assert_eq!(align_up(64, 64), 64);
        assert_eq!(align_up(144, 64), 192);
    }

    #[test]
    fn skips_section_headers() {
        let mut out = Vec::new();
        write_device_binary("ProgramBinaryHeader:", &mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn hex_lines_emit_bytes() {
        let mut out = Vec::new();
        write_device_binary("\tHex 48 65 6c 6c 6f 20 77 6f 72 6c 64", &mut out).unwrap();
        assert_eq!(out, b"Hello world");
    }

    #[test]
    fn field_lines_emit_little_endian() {
        let mut out = Vec::new();
        write_device_binary("\t1 CheckOne 220", &mut out).unwrap();
        assert_eq!(out, [220]);

        out.clear();
        write_device_binary("\t2 CheckTwo 2428", &mut out).unwrap();
        assert_eq!(out, 2428u16.to_le_bytes());

        out.clear();
        write_device_binary("\t4 CheckThree 242806820", &mut out).unwrap();
        assert_eq!(out, 242806820u32.to_le_bytes());

        out.clear();
        write_device_binary("\t8 CheckFour 242806820487", &mut out).unwrap();
        assert_eq!(out, 242806820487u64.to_le_bytes());
    }

    #[test]
    fn oversized_values_truncate() {
        let mut out = Vec::new();
        write_device_binary("\t1 Tiny 300", &mut out).unwrap();
        assert_eq!(out, [44]);
    }

    #[test]
    fn unknown_width_is_an_error() {
        let mut out = Vec::new();
        assert!(write_device_binary("\t3 Odd 1", &mut out).is_err());
        assert!(write_device_binary("garbage", &mut out).is_err());
    }

    #[test]
    fn patch_list_size_recalculation() {
        let mut ptm = lines(&[
            "ProgramBinaryHeader:",
            "\t4 NumberOfKernels 1",
            "\t4 PatchListSize 7",
            "PATCH_TOKEN_SOMETHING:",
            "\t4 Token 19",
            "\t4 Size 12",
            "\t4 InterfaceDescriptorDataOffset 0",
            "Kernel #0",
            "KernelBinaryHeader:",
            "\t4 PatchListSize 0",
        ]);
        calculate_patch_list_sizes(&mut ptm);
        assert_eq!(ptm[2], "\t4 PatchListSize 12");
        // the kernel's zero list is untouched
        assert_eq!(ptm[9], "\t4 PatchListSize 0");
    }

    #[test]
    fn recalculation_counts_hex_bytes() {
        let mut ptm = lines(&[
            "\t4 PatchListSize 0",
            "PATCH_TOKEN_ALLOCATE_CONSTANT_MEMORY_SURFACE_PROGRAM_BINARY_INFO:",
            "\t4 Token 42",
            "\t4 Size 16",
            "\t4 ConstantBufferIndex 0",
            "\t4 InlineDataSize 14",
            "\tHex 0 1 2 3 4 5 6 7 8 9 a b c d",
        ]);
        calculate_patch_list_sizes(&mut ptm);
        assert_eq!(ptm[0], "\t4 PatchListSize 30");
    }

    #[test]
    fn matching_size_is_left_alone() {
        let mut ptm = lines(&[
            "\t4 PatchListSize 12",
            "PATCH_TOKEN_SOMETHING:",
            "\t4 Token 19",
            "\t4 Size 12",
            "\t4 InterfaceDescriptorDataOffset 0",
        ]);
        let before = ptm.clone();
        calculate_patch_list_sizes(&mut ptm);
        assert_eq!(ptm, before);
    }
}
