//! The PTM field schema
//!
//! PTM rendering and re-assembly are driven by tables of `(size, name)`
//! field descriptors. The tables come from the patch list header sources
//! when a patch directory is supplied, otherwise from a built-in default
//! that knows the program and kernel binary headers but no tokens (those
//! then render as `Unidentified PatchToken` hex blobs).

use crate::CodecError;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// One field descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Field width in bytes: 1, 2, 4 or 8
    pub size: u8,
    /// Field name as spelled in the header source
    pub name: String,
}

/// A fixed size header described field by field
#[derive(Debug, Clone, Default)]
pub struct StructDesc {
    /// The fields, in declaration order
    pub fields: Vec<Field>,
    /// Total size in bytes
    pub size: u32,
}

/// A patch token: its enumerator name and payload fields
#[derive(Debug, Clone, Default)]
pub struct TokenDesc {
    /// Enumerator name (e.g. `PATCH_TOKEN_THREAD_PAYLOAD`)
    pub name: String,
    /// Payload fields after the common 8 byte header
    pub fields: Vec<Field>,
    /// Total payload size in bytes
    pub size: u32,
}

/// The complete schema
#[derive(Debug, Clone, Default)]
pub struct Schema {
    /// The program binary header
    pub program_header: StructDesc,
    /// The kernel binary header (base + common part)
    pub kernel_header: StructDesc,
    /// Known patch tokens by id
    pub patch_tokens: HashMap<u32, TokenDesc>,
}

/// Maps a C integer type name to its width
pub fn type_size(type_str: &str) -> Result<u8, CodecError> {
    match type_str {
        "uint8_t" => Ok(1),
        "uint16_t" => Ok(2),
        "uint32_t" => Ok(4),
        "uint64_t" => Ok(8),
        other => Err(CodecError::Internal(format!("Unhandled type: {}", other))),
    }
}

const DEFAULT_PATCH_LIST: &[&str] = &[
    "struct SProgramBinaryHeader",
    "{",
    "    uint32_t   Magic;",
    "    uint32_t   Version;",
    "    uint32_t   Device;",
    "    uint32_t   GPUPointerSizeInBytes;",
    "    uint32_t   NumberOfKernels;",
    "    uint32_t   SteppingId;",
    "    uint32_t   PatchListSize;",
    "};",
    "",
    "struct SKernelBinaryHeader",
    "{",
    "    uint32_t   CheckSum;",
    "    uint64_t   ShaderHashCode;",
    "    uint32_t   KernelNameSize;",
    "    uint32_t   PatchListSize;",
    "};",
    "",
    "struct SKernelBinaryHeaderCommon :",
    "       SKernelBinaryHeader",
    "{",
    "    uint32_t   KernelHeapSize;",
    "    uint32_t   GeneralStateHeapSize;",
    "    uint32_t   DynamicStateHeapSize;",
    "    uint32_t   SurfaceStateHeapSize;",
    "    uint32_t   KernelUnpaddedSize;",
    "};",
    "",
    "enum PATCH_TOKEN",
    "{",
    "};",
];

fn find_pos(lines: &[String], needle: &str) -> Option<usize> {
    lines.iter().position(|line| line.contains(needle))
}

/// Collects the integer fields of a struct body starting at `start`
/// (the line after the opening brace or the struct name)
///
/// Returns the fields and their summed size; stops at `};`
pub fn read_struct_fields(
    lines: &[String],
    start: usize,
) -> Result<(Vec<Field>, u32), CodecError> {
    let mut fields = Vec::new();
    let mut full_size = 0u32;
    for line in &lines[start.min(lines.len())..] {
        if line.contains("};") {
            break;
        }
        if !line.contains("int") {
            continue;
        }
        let mut words = line.split_whitespace();
        let type_str = match words.next() {
            Some(w) => w,
            None => continue,
        };
        let size = type_size(type_str)?;
        let name = match words.next() {
            Some(w) => w.trim_end_matches(';').to_string(),
            None => continue,
        };
        full_size += u32::from(size);
        fields.push(Field { size, name });
    }
    Ok((fields, full_size))
}

fn parse(lines: &[String]) -> Result<Schema, CodecError> {
    for anchor in [
        "struct SProgramBinaryHeader",
        "enum PATCH_TOKEN",
        "struct SKernelBinaryHeader",
        "struct SKernelBinaryHeaderCommon :",
    ] {
        if find_pos(lines, anchor).is_none() {
            return Err(CodecError::Internal(format!(
                "While parsing patchtoken definitions: couldn't find {}",
                anchor
            )));
        }
    }

    let mut schema = Schema::default();

    // every enumerator counts towards the token id; only the ones annotated
    // with @StructName@ whose struct body is present get a field table
    let enum_pos = find_pos(lines, "enum PATCH_TOKEN").expect("anchor was checked");
    let mut patch_no = 0u32;
    for line in &lines[enum_pos + 1..] {
        if line.contains("};") {
            break;
        }
        if !line.contains("PATCH_TOKEN") {
            continue;
        }
        let Some(at_start) = line.find('@') else {
            patch_no += 1;
            continue;
        };
        let name_start = line.find("PATCH_TOKEN").expect("matched above");
        let name_end = line[name_start..]
            .find(',')
            .map(|p| name_start + p)
            .unwrap_or(line.len());
        let token_name = line[name_start..name_end].to_string();

        let Some(at_end) = line[at_start + 1..].find('@').map(|p| at_start + 1 + p) else {
            patch_no += 1;
            continue;
        };
        let struct_name = format!("struct {} :", &line[at_start + 1..at_end]);

        let Some(struct_pos) = find_pos(lines, &struct_name) else {
            patch_no += 1;
            continue;
        };
        let (fields, size) = read_struct_fields(lines, struct_pos + 1)?;
        schema.patch_tokens.insert(
            patch_no,
            TokenDesc {
                name: token_name,
                fields,
                size,
            },
        );
        patch_no += 1;
    }

    let struct_pos = find_pos(lines, "struct SProgramBinaryHeader").expect("anchor was checked");
    let (fields, size) = read_struct_fields(lines, struct_pos + 1)?;
    schema.program_header = StructDesc { fields, size };

    let struct_pos = find_pos(lines, "struct SKernelBinaryHeader").expect("anchor was checked");
    let (mut fields, mut size) = read_struct_fields(lines, struct_pos + 1)?;
    let struct_pos =
        find_pos(lines, "struct SKernelBinaryHeaderCommon :").expect("anchor was checked");
    let (common_fields, common_size) = read_struct_fields(lines, struct_pos + 1)?;
    fields.extend(common_fields);
    size += common_size;
    schema.kernel_header = StructDesc { fields, size };

    Ok(schema)
}

impl Schema {
    /// The built-in schema: full program/kernel headers, no tokens
    pub fn builtin() -> Self {
        let lines: Vec<String> = DEFAULT_PATCH_LIST.iter().map(|s| s.to_string()).collect();
        parse(&lines).expect("the built-in patch list always parses")
    }

    /// Parses the schema out of the patch list headers found in `dir`
    ///
    /// `patch_list.h` is required; the shared and per generation headers
    /// are folded in when present.
    pub fn from_patch_dir(dir: &Path) -> Result<Self, CodecError> {
        let mut lines = read_header(dir, "patch_list.h", true)?;
        for header in [
            "patch_shared.h",
            "patch_g7.h",
            "patch_g8.h",
            "patch_g9.h",
            "patch_g10.h",
        ] {
            match read_header(dir, header, false) {
                Ok(mut more) => lines.append(&mut more),
                Err(_) => warn!("Patch header {} not found - skipping", header),
            }
        }
        info!("Parsing patchtoken definitions from {}", dir.display());
        parse(&lines)
    }
}

fn read_header(dir: &Path, name: &str, required: bool) -> Result<Vec<String>, CodecError> {
    let path = dir.join(name);
    let text = std::fs::read_to_string(&path).map_err(|e| {
        if required {
            CodecError::io(&path, e)
        } else {
            CodecError::Internal(format!("{} not found", path.display()))
        }
    })?;
    // tabs would defeat the whitespace splits below
    Ok(text.lines().map(|line| line.replace('\t', " ")).collect())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sizes() {
        assert_eq!(type_size("uint8_t").unwrap(), 1);
        assert_eq!(type_size("uint16_t").unwrap(), 2);
        assert_eq!(type_size("uint32_t").unwrap(), 4);
        assert_eq!(type_size("uint64_t").unwrap(), 8);
        assert!(type_size("float").is_err());
    }

    #[test]
    fn builtin_headers() {
        let schema = Schema::builtin();

        let ph = &schema.program_header;
        assert_eq!(ph.size, 28);
        let names: Vec<&str> = ph.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "Magic",
                "Version",
                "Device",
                "GPUPointerSizeInBytes",
                "NumberOfKernels",
                "SteppingId",
                "PatchListSize"
            ]
        );
        assert!(ph.fields.iter().all(|f| f.size == 4));

        let kh = &schema.kernel_header;
        assert_eq!(kh.size, 40);
        let names: Vec<&str> = kh.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "CheckSum",
                "ShaderHashCode",
                "KernelNameSize",
                "PatchListSize",
                "KernelHeapSize",
                "GeneralStateHeapSize",
                "DynamicStateHeapSize",
                "SurfaceStateHeapSize",
                "KernelUnpaddedSize"
            ]
        );
        assert_eq!(kh.fields[1].size, 8);

        assert!(schema.patch_tokens.is_empty());
    }

    #[test]
    fn struct_fields() {
        let lines: Vec<String> = [
            "/*           */",
            "struct SPatchSamplerStateArray :",
            "       SPatchItemHeader",
            "{",
            "    uint64_t   SomeField;",
            "    uint32_t   Offset;",
            "",
            "    uint16_t   Count;",
            "    uint8_t    BorderColorOffset;",
            "};",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let (fields, full_size) = read_struct_fields(&lines, 4).unwrap();
        assert_eq!(full_size, 15);
        assert_eq!(fields[0], Field { size: 8, name: "SomeField".into() });
        assert_eq!(fields[1], Field { size: 4, name: "Offset".into() });
        assert_eq!(fields[2], Field { size: 2, name: "Count".into() });
        assert_eq!(
            fields[3],
            Field {
                size: 1,
                name: "BorderColorOffset".into()
            }
        );
    }

    #[test]
    fn annotated_enum() {
        let mut lines: Vec<String> = DEFAULT_PATCH_LIST.iter().map(|s| s.to_string()).collect();
        // graft an annotated enum over the empty default one
        let enum_pos = lines.iter().position(|l| l == "enum PATCH_TOKEN").unwrap();
        lines.splice(
            enum_pos + 2..enum_pos + 2,
            [
                "    PATCH_TOKEN_UNKNOWN,                // 0",
                "    PATCH_TOKEN_MEDIA_STATE_POINTERS,   // 1",
                "    PATCH_TOKEN_STATE_SIP,              // 2 @SPatchStateSIP@",
                "    PATCH_TOKEN_NO_STRUCT,              // 3 @SPatchMissing@",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        lines.extend(
            [
                "struct SPatchStateSIP :",
                "       SPatchItemHeader",
                "{",
                "    uint32_t   SystemKernelOffset;",
                "};",
            ]
            .iter()
            .map(|s| s.to_string()),
        );

        let schema = parse(&lines).unwrap();
        assert_eq!(schema.patch_tokens.len(), 1);
        let sip = &schema.patch_tokens[&2];
        assert_eq!(sip.name, "PATCH_TOKEN_STATE_SIP");
        assert_eq!(sip.size, 4);
        assert_eq!(sip.fields[0].name, "SystemKernelOffset");
        // the unresolvable annotation still consumed id 3
        assert!(!schema.patch_tokens.contains_key(&3));
    }

    #[test]
    fn missing_anchor() {
        let lines: Vec<String> = ["enum PATCH_TOKEN", "{", "};"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(parse(&lines).is_err());
    }
}
