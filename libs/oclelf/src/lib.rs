//! # A library to read and write OpenCL flavoured ELF64 containers
//!
//! OpenCL offline compilers ship program binaries inside a reduced ELF64
//! dialect: a 64 byte header followed by section headers, section data and a
//! trailing string table. Sections use vendor type codes (starting at
//! `0xff000000`) to mark build options, LLVM/SPIR-V IR and the device binary
//! blob.
//!
//! The [`Elf`] reader validates an untrusted byte buffer (magic, class,
//! entry sizes, per section bounds and the total accounted size) and hands
//! out borrowed views of the section data; the [`writer::ElfWriter`]
//! assembles a container from scratch, appending the implicit null section
//! and string table.
//!
//! # Errors
//! Parse failures are reported as [`Result<T, std::io::Error>`] with
//! [`ErrorKind`](std::io::ErrorKind) set to
//! [`InvalidData`](std::io::ErrorKind::InvalidData)

#![warn(missing_docs)]

pub mod writer;

use oclutils::io::SliceCursor;
use serde::Serialize;
use std::io;
use tracing::warn;

/// The four magic bytes opening every container
pub const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];
/// Identity byte index of the file class
pub const ID_IDX_CLASS: usize = 4;
/// Identity byte index of the format version
pub const ID_IDX_VERSION: usize = 5;
/// 64-bit class marker
pub const CLASS_64: u8 = 2;
/// Current format version marker
pub const VERSION_CURRENT: u8 = 1;
/// Size of the file header
pub const ELF_HEADER_SIZE: usize = 64;
/// Size of one section header table entry
pub const SECTION_HEADER_SIZE: usize = 64;

/// Container type codes (`e_type`)
pub mod eh_type {
    /// No type
    pub const NONE: u16 = 0;
    /// Relocatable object
    pub const RELOCATABLE: u16 = 1;
    /// Executable
    pub const EXECUTABLE: u16 = 2;
    /// Shared object
    pub const DYNAMIC: u16 = 3;
    /// Core dump
    pub const CORE: u16 = 4;
    /// OpenCL source container
    pub const OPENCL_SOURCE: u16 = 0xff01;
    /// OpenCL objects container (LLVM binary output)
    pub const OPENCL_OBJECTS: u16 = 0xff02;
    /// OpenCL library container (LLVM archive output)
    pub const OPENCL_LIBRARY: u16 = 0xff03;
    /// OpenCL executable container
    pub const OPENCL_EXECUTABLE: u16 = 0xff04;
    /// OpenCL debug container
    pub const OPENCL_DEBUG: u16 = 0xff05;
}

/// Section type codes (`sh_type`)
pub mod sh_type {
    /// Null section
    pub const NULL: u32 = 0;
    /// Program data
    pub const PROGBITS: u32 = 1;
    /// Symbol table
    pub const SYMTAB: u32 = 2;
    /// String table
    pub const STRTAB: u32 = 3;
    /// OpenCL source
    pub const OPENCL_SOURCE: u32 = 0xff000000;
    /// OpenCL header to link into the LLVM binary
    pub const OPENCL_HEADER: u32 = 0xff000001;
    /// LLVM text
    pub const OPENCL_LLVM_TEXT: u32 = 0xff000002;
    /// LLVM byte code
    pub const OPENCL_LLVM_BINARY: u32 = 0xff000003;
    /// LLVM archive(s)
    pub const OPENCL_LLVM_ARCHIVE: u32 = 0xff000004;
    /// Device binary blob
    pub const OPENCL_DEV_BINARY: u32 = 0xff000005;
    /// Compiler options the binary was built with
    pub const OPENCL_OPTIONS: u32 = 0xff000006;
    /// Precompiled headers
    pub const OPENCL_PCH: u32 = 0xff000007;
    /// Device debug data
    pub const OPENCL_DEV_DEBUG: u32 = 0xff000008;
    /// SPIR-V module
    pub const SPIRV: u32 = 0xff000009;
    /// Non-coherent device binary blob
    pub const NON_COHERENT_DEV_BINARY: u32 = 0xff00000a;
}

/// Describes a container type code
pub fn eh_type_str(e_type: u16) -> &'static str {
    match e_type {
        eh_type::NONE => "No type",
        eh_type::RELOCATABLE => "Relocatable",
        eh_type::EXECUTABLE => "Executable",
        eh_type::DYNAMIC => "Shared object",
        eh_type::CORE => "Core",
        eh_type::OPENCL_SOURCE => "OpenCL source",
        eh_type::OPENCL_OBJECTS => "OpenCL objects",
        eh_type::OPENCL_LIBRARY => "OpenCL library",
        eh_type::OPENCL_EXECUTABLE => "OpenCL executable",
        eh_type::OPENCL_DEBUG => "OpenCL debug",
        _ => "*** UNKNOWN ***",
    }
}

/// Describes a section type code
pub fn sh_type_str(sh_type: u32) -> &'static str {
    match sh_type {
        sh_type::NULL => "NULL",
        sh_type::PROGBITS => "PROGBITS",
        sh_type::SYMTAB => "SYMTAB",
        sh_type::STRTAB => "STRTAB",
        sh_type::OPENCL_SOURCE => "OPENCL_SOURCE",
        sh_type::OPENCL_HEADER => "OPENCL_HEADER",
        sh_type::OPENCL_LLVM_TEXT => "OPENCL_LLVM_TEXT",
        sh_type::OPENCL_LLVM_BINARY => "OPENCL_LLVM_BINARY",
        sh_type::OPENCL_LLVM_ARCHIVE => "OPENCL_LLVM_ARCHIVE",
        sh_type::OPENCL_DEV_BINARY => "OPENCL_DEV_BINARY",
        sh_type::OPENCL_OPTIONS => "OPENCL_OPTIONS",
        sh_type::OPENCL_PCH => "OPENCL_PCH",
        sh_type::OPENCL_DEV_DEBUG => "OPENCL_DEV_DEBUG",
        sh_type::SPIRV => "SPIRV",
        sh_type::NON_COHERENT_DEV_BINARY => "NON_COHERENT_DEV_BINARY",
        _ => "*** UNKNOWN ***",
    }
}

/// The 64 byte container header
#[derive(Debug, Serialize)]
pub struct ElfHeader64 {
    /// File identification data
    pub identity: [u8; 16],
    /// Container type
    pub e_type: u16,
    /// Description of the container type (not an official field)
    pub e_typestr: &'static str,
    /// Target architecture
    pub machine: u16,
    /// Format version
    pub version: u32,
    /// Entry point address
    pub entry: u64,
    /// Offset to the program header table
    pub phoff: u64,
    /// Offset to the section header table
    pub shoff: u64,
    /// Flags (architecture dependant)
    pub flags: u32,
    /// Size of this header
    pub ehsize: u16,
    /// Size of a program header table entry
    pub phentsize: u16,
    /// Number of entries in the program header table
    pub phnum: u16,
    /// Size of a section header table entry
    pub shentsize: u16,
    /// Number of entries in the section header table
    pub shnum: u16,
    /// Index of the section header entry containing the section names
    pub shstrndx: u16,
}

impl ElfHeader64 {
    fn parse(cur: &mut SliceCursor) -> Result<Self, io::Error> {
        let identity: [u8; 16] = cur
            .take(16)?
            .try_into()
            .expect("sixteen bytes were just taken");
        if identity[0..4] != ELF_MAGIC {
            return Err(invalid_data("Invalid ELF header signature"));
        }
        if identity[ID_IDX_CLASS] != CLASS_64 {
            return Err(invalid_data("Invalid class specification"));
        }
        let e_type = cur.rdu16()?;
        Ok(Self {
            identity,
            e_type,
            e_typestr: eh_type_str(e_type),
            machine: cur.rdu16()?,
            version: cur.rdu32()?,
            entry: cur.rdu64()?,
            phoff: cur.rdu64()?,
            shoff: cur.rdu64()?,
            flags: cur.rdu32()?,
            ehsize: cur.rdu16()?,
            phentsize: cur.rdu16()?,
            phnum: cur.rdu16()?,
            shentsize: cur.rdu16()?,
            shnum: cur.rdu16()?,
            shstrndx: cur.rdu16()?,
        })
    }
}

/// One section header table entry
#[derive(Debug, Serialize)]
pub struct ElfSection {
    /// Offset of the section name in the string table
    pub name_offset: u32,
    /// Resolved section name (not an official field)
    pub name: String,
    /// Section type
    pub sh_type: u32,
    /// Description of the section type (not an official field)
    pub sh_typestr: &'static str,
    /// Section flags
    pub flags: u64,
    /// Section address in memory
    pub addr: u64,
    /// Section data offset in the file
    pub data_offset: u64,
    /// Section data size in bytes
    pub data_size: u64,
    /// Section header table index link
    pub link: u32,
    /// Extra information (depends on the section type)
    pub info: u32,
    /// Address alignment constraint
    pub addralign: u64,
    /// Size of an entry, for sections holding fixed size entries
    pub entsize: u64,
}

impl ElfSection {
    fn parse(cur: &mut SliceCursor) -> Result<Self, io::Error> {
        let name_offset = cur.rdu32()?;
        let sh_type = cur.rdu32()?;
        Ok(Self {
            name_offset,
            name: String::new(),
            sh_type,
            sh_typestr: sh_type_str(sh_type),
            flags: cur.rdu64()?,
            addr: cur.rdu64()?,
            data_offset: cur.rdu64()?,
            data_size: cur.rdu64()?,
            link: cur.rdu32()?,
            info: cur.rdu32()?,
            addralign: cur.rdu64()?,
            entsize: cur.rdu64()?,
        })
    }
}

fn invalid_data(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

/// The parsed container
///
/// Section data stays inside the caller's buffer; [`section_data`](Self::section_data)
/// returns borrowed views valid for the buffer's lifetime.
#[derive(Debug, Serialize)]
pub struct Elf<'a> {
    /// The container header
    pub header: ElfHeader64,
    /// The section headers, in file order
    pub sections: Vec<ElfSection>,
    #[serde(skip)]
    data: &'a [u8],
}

impl<'a> Elf<'a> {
    /// Parses and validates the container found in `data`
    pub fn parse(data: &'a [u8]) -> Result<Self, io::Error> {
        if data.len() < ELF_HEADER_SIZE {
            return Err(invalid_data("Binary is smaller than the ELF header"));
        }
        let mut cur = SliceCursor::new(data);
        let header = ElfHeader64::parse(&mut cur)?;
        if usize::from(header.shentsize) != SECTION_HEADER_SIZE {
            return Err(invalid_data("Invalid section header entry size"));
        }

        // every section header entry must lie inside the file
        let table_size = (u64::from(header.shnum))
            .checked_mul(SECTION_HEADER_SIZE as u64)
            .and_then(|sz| header.shoff.checked_add(sz))
            .ok_or_else(|| invalid_data("Section header table offset overflow"))?;
        if table_size > data.len() as u64 {
            return Err(invalid_data("Section header table exceeds the binary"));
        }

        let mut sections = Vec::with_capacity(usize::from(header.shnum));
        let mut accounted = ELF_HEADER_SIZE as u64;
        for i in 0..header.shnum {
            let off = header.shoff as usize + usize::from(i) * SECTION_HEADER_SIZE;
            let mut entry = SliceCursor::new(&data[off..off + SECTION_HEADER_SIZE]);
            let section = ElfSection::parse(&mut entry)?;
            let data_end = section
                .data_offset
                .checked_add(section.data_size)
                .ok_or_else(|| invalid_data("Section data offset overflow"))?;
            if data_end > data.len() as u64 {
                return Err(invalid_data("Section data exceeds the binary"));
            }
            accounted += SECTION_HEADER_SIZE as u64 + section.data_size;
            sections.push(section);
        }

        // the header, the entries and the data must account for every byte
        if accounted != data.len() as u64 {
            return Err(invalid_data("Inconsistent section layout"));
        }

        let mut elf = Self {
            header,
            sections,
            data,
        };
        elf.resolve_names()?;
        Ok(elf)
    }

    fn resolve_names(&mut self) -> Result<(), io::Error> {
        if self.header.shstrndx >= self.header.shnum {
            if self.header.shnum > 0 {
                warn!("String table index {} is out of range", self.header.shstrndx);
            }
            return Ok(());
        }
        let strtab = &self.sections[usize::from(self.header.shstrndx)];
        let start = strtab.data_offset as usize;
        let size = strtab.data_size as usize;
        let table = &self.data[start..start + size];
        let mut names = Vec::with_capacity(self.sections.len());
        for section in &self.sections {
            let name_offset = section.name_offset as usize;
            if size == 0 && name_offset == 0 {
                names.push(String::new());
                continue;
            }
            if name_offset >= size {
                return Err(invalid_data("Section name offset exceeds the string table"));
            }
            let tail = &table[name_offset..];
            let nul = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
            names.push(String::from_utf8_lossy(&tail[..nul]).into_owned());
        }
        for (section, name) in self.sections.iter_mut().zip(names) {
            section.name = name;
        }
        Ok(())
    }

    /// Returns the data of `section` as a view into the parsed buffer
    pub fn section_data(&self, section: &ElfSection) -> &'a [u8] {
        let start = section.data_offset as usize;
        &self.data[start..start + section.data_size as usize]
    }

    /// Returns the first section of the given type, if any
    pub fn find_section(&self, sh_type: u32) -> Option<&ElfSection> {
        self.sections.iter().find(|s| s.sh_type == sh_type)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::writer::ElfWriter;

    fn sample() -> Vec<u8> {
        let mut w = ElfWriter::new(eh_type::OPENCL_EXECUTABLE, 0, 0);
        w.add_section(sh_type::OPENCL_OPTIONS, 0, "BuildOptions", b"-cl-std=CL1.2");
        w.add_section(
            sh_type::OPENCL_DEV_BINARY,
            0,
            "Intel(R) OpenCL Device Binary",
            &[1, 2, 3, 4],
        );
        w.encode()
    }

    #[test]
    fn parse_rejects_short_input() {
        let err = Elf::parse(&[0u8; 63]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn parse_rejects_bad_magic() {
        let mut bin = sample();
        bin[0] = 0x7e;
        assert!(Elf::parse(&bin).is_err());
    }

    #[test]
    fn parse_rejects_bad_class() {
        let mut bin = sample();
        bin[ID_IDX_CLASS] = 1;
        assert!(Elf::parse(&bin).is_err());
    }

    #[test]
    fn parse_rejects_zero_entry_size() {
        let mut bin = sample();
        // shentsize lives at offset 58
        bin[58] = 0;
        bin[59] = 0;
        assert!(Elf::parse(&bin).is_err());
    }

    #[test]
    fn parse_rejects_data_overflow() {
        let mut bin = sample();
        let shoff = ELF_HEADER_SIZE;
        // grow the first data section's size field past the file end
        let entry = shoff + SECTION_HEADER_SIZE; // section 1
        let size_off = entry + 32;
        bin[size_off..size_off + 8].copy_from_slice(&u64::MAX.to_le_bytes());
        assert!(Elf::parse(&bin).is_err());
    }

    #[test]
    fn parse_rejects_truncation() {
        let bin = sample();
        assert!(Elf::parse(&bin[..bin.len() - 1]).is_err());
    }

    #[test]
    fn roundtrip() {
        let bin = sample();
        let elf = Elf::parse(&bin).unwrap();
        assert_eq!(elf.header.e_type, eh_type::OPENCL_EXECUTABLE);
        assert_eq!(elf.header.ehsize, 64);
        assert_eq!(elf.header.shentsize, 64);
        assert_eq!(elf.header.shnum, 4); // null + 2 + strtab
        assert_eq!(elf.header.shstrndx, 3);

        assert_eq!(elf.sections[0].sh_type, sh_type::NULL);
        assert_eq!(elf.sections[0].name, "");
        assert_eq!(elf.sections[1].name, "BuildOptions");
        assert_eq!(elf.sections[3].sh_type, sh_type::STRTAB);

        let dev = elf.find_section(sh_type::OPENCL_DEV_BINARY).unwrap();
        assert_eq!(elf.section_data(dev), &[1, 2, 3, 4]);

        // re-encoding the parsed view reproduces the input bit for bit
        let mut w = ElfWriter::new(elf.header.e_type, elf.header.machine, elf.header.flags);
        for section in &elf.sections {
            if section.sh_type == sh_type::NULL || section.sh_type == sh_type::STRTAB {
                continue;
            }
            w.add_section(
                section.sh_type,
                section.flags,
                &section.name,
                elf.section_data(section),
            );
        }
        assert_eq!(w.encode(), bin);
    }
}
