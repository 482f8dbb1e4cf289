//! Container assembly
//!
//! Sections are queued in insertion order; [`ElfWriter::encode`] lays the
//! file out as `header | section headers | section data | string table`,
//! with an implicit null section in front and the string table appended as
//! the last section.

use crate::{
    eh_type_str, sh_type, CLASS_64, ELF_HEADER_SIZE, ELF_MAGIC, ID_IDX_CLASS, ID_IDX_VERSION,
    SECTION_HEADER_SIZE, VERSION_CURRENT,
};
use byteorder::{WriteBytesExt, LE};
use std::io::{self, Write};
use tracing::debug;

struct SectionNode {
    sh_type: u32,
    flags: u64,
    name: String,
    data: Vec<u8>,
}

/// Accumulates sections and resolves them into a container
pub struct ElfWriter {
    e_type: u16,
    machine: u16,
    flags: u32,
    nodes: Vec<SectionNode>,
    data_size: usize,
    string_table_size: usize,
}

impl ElfWriter {
    /// Creates a writer for a container of the given type, machine and flags
    pub fn new(e_type: u16, machine: u16, flags: u32) -> Self {
        let mut writer = Self {
            e_type,
            machine,
            flags,
            nodes: Vec::new(),
            data_size: 0,
            string_table_size: 0,
        };
        // section 0 is always a null section
        writer.add_section(sh_type::NULL, 0, "", &[]);
        writer
    }

    /// Queues a named section
    pub fn add_section(&mut self, sh_type: u32, flags: u64, name: &str, data: &[u8]) {
        self.data_size += data.len();
        self.string_table_size += name.len() + 1;
        self.nodes.push(SectionNode {
            sh_type,
            flags,
            name: name.to_string(),
            data: data.to_vec(),
        });
    }

    /// Total size of the resolved container in bytes
    pub fn binary_size(&self) -> usize {
        let num_sections = self.nodes.len() + 1; // +1 for the string table entry
        ELF_HEADER_SIZE + num_sections * SECTION_HEADER_SIZE + self.data_size
            + self.string_table_size
    }

    /// Resolves the queued sections into container bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.binary_size());
        self.write_to(&mut out)
            .expect("writing into a Vec cannot fail");
        debug!(
            "Resolved {} ({} sections, {} bytes)",
            eh_type_str(self.e_type),
            self.nodes.len() + 1,
            out.len()
        );
        out
    }

    fn write_to<W: Write>(&self, out: &mut W) -> Result<(), io::Error> {
        let num_sections = self.nodes.len() + 1;
        let headers_end = ELF_HEADER_SIZE + num_sections * SECTION_HEADER_SIZE;
        let string_table_offset = headers_end + self.data_size;

        // file header
        let mut identity = [0u8; 16];
        identity[0..4].copy_from_slice(&ELF_MAGIC);
        identity[ID_IDX_CLASS] = CLASS_64;
        identity[ID_IDX_VERSION] = VERSION_CURRENT;
        out.write_all(&identity)?;
        out.write_u16::<LE>(self.e_type)?;
        out.write_u16::<LE>(self.machine)?;
        out.write_u32::<LE>(0)?; // version
        out.write_u64::<LE>(0)?; // entry address
        out.write_u64::<LE>(0)?; // program headers offset
        out.write_u64::<LE>(ELF_HEADER_SIZE as u64)?; // section headers offset
        out.write_u32::<LE>(self.flags)?;
        out.write_u16::<LE>(ELF_HEADER_SIZE as u16)?;
        out.write_u16::<LE>(0)?; // program header entry size
        out.write_u16::<LE>(0)?; // program header entries
        out.write_u16::<LE>(SECTION_HEADER_SIZE as u16)?;
        out.write_u16::<LE>(num_sections as u16)?;
        out.write_u16::<LE>((num_sections - 1) as u16)?; // name table is last

        // section headers
        let mut data_offset = headers_end as u64;
        let mut name_offset = 0u32;
        for node in &self.nodes {
            write_section_header(
                out,
                name_offset,
                node.sh_type,
                node.flags,
                data_offset,
                node.data.len() as u64,
            )?;
            data_offset += node.data.len() as u64;
            name_offset += node.name.len() as u32 + 1;
        }
        // the implicit string table entry
        write_section_header(
            out,
            0,
            sh_type::STRTAB,
            0,
            string_table_offset as u64,
            self.string_table_size as u64,
        )?;

        // section data
        for node in &self.nodes {
            out.write_all(&node.data)?;
        }

        // string table
        for node in &self.nodes {
            out.write_all(node.name.as_bytes())?;
            out.write_u8(0)?;
        }
        Ok(())
    }
}

fn write_section_header<W: Write>(
    out: &mut W,
    name_offset: u32,
    sh_type: u32,
    flags: u64,
    data_offset: u64,
    data_size: u64,
) -> Result<(), io::Error> {
    out.write_u32::<LE>(name_offset)?;
    out.write_u32::<LE>(sh_type)?;
    out.write_u64::<LE>(flags)?;
    out.write_u64::<LE>(0)?; // address
    out.write_u64::<LE>(data_offset)?;
    out.write_u64::<LE>(data_size)?;
    out.write_u32::<LE>(0)?; // link
    out.write_u32::<LE>(0)?; // info
    out.write_u64::<LE>(0)?; // alignment
    out.write_u64::<LE>(0)?; // entry size
    Ok(())
}
