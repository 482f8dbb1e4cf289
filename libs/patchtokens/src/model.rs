//! The decoded device binary model
//!
//! All views borrow from the input buffer; the caller owns the bytes for the
//! model's lifetime.

use serde::Serialize;

/// Program header magic ("CTNI" on disk)
pub const MAGIC_CL: u32 = 0x494e5443;
/// Size of the program binary header
pub const PROGRAM_BINARY_HEADER_SIZE: usize = 28;
/// Size of the kernel binary header
pub const KERNEL_BINARY_HEADER_SIZE: usize = 40;
/// Size of the common patch token header (token id + size)
pub const PATCH_ITEM_HEADER_SIZE: usize = 8;

/// Patch token ids
#[allow(missing_docs)]
pub mod token {
    pub const UNKNOWN: u32 = 0;
    pub const MEDIA_STATE_POINTERS: u32 = 1;
    pub const STATE_SIP: u32 = 2;
    pub const CS_URB_STATE: u32 = 3;
    pub const CONSTANT_BUFFER: u32 = 4;
    pub const SAMPLER_STATE_ARRAY: u32 = 5;
    pub const INTERFACE_DESCRIPTOR: u32 = 6;
    pub const VFE_STATE: u32 = 7;
    pub const BINDING_TABLE_STATE: u32 = 8;
    pub const ALLOCATE_SCRATCH_SURFACE: u32 = 9;
    pub const ALLOCATE_SIP_SURFACE: u32 = 10;
    pub const GLOBAL_MEMORY_OBJECT_KERNEL_ARGUMENT: u32 = 11;
    pub const IMAGE_MEMORY_OBJECT_KERNEL_ARGUMENT: u32 = 12;
    pub const CONSTANT_MEMORY_OBJECT_KERNEL_ARGUMENT: u32 = 13;
    pub const ALLOCATE_SURFACE_WITH_INITIALIZATION: u32 = 14;
    pub const ALLOCATE_LOCAL_SURFACE: u32 = 15;
    pub const SAMPLER_KERNEL_ARGUMENT: u32 = 16;
    pub const DATA_PARAMETER_BUFFER: u32 = 17;
    pub const MEDIA_VFE_STATE: u32 = 18;
    pub const MEDIA_INTERFACE_DESCRIPTOR_LOAD: u32 = 19;
    pub const MEDIA_CURBE_LOAD: u32 = 20;
    pub const INTERFACE_DESCRIPTOR_DATA: u32 = 21;
    pub const THREAD_PAYLOAD: u32 = 22;
    pub const EXECUTION_ENVIRONMENT: u32 = 23;
    pub const ALLOCATE_PRIVATE_MEMORY: u32 = 24;
    pub const DATA_PARAMETER_STREAM: u32 = 25;
    pub const KERNEL_ARGUMENT_INFO: u32 = 26;
    pub const KERNEL_ATTRIBUTES_INFO: u32 = 27;
    pub const STRING: u32 = 28;
    pub const ALLOCATE_PRINTF_SURFACE: u32 = 29;
    pub const STATELESS_GLOBAL_MEMORY_OBJECT_KERNEL_ARGUMENT: u32 = 30;
    pub const STATELESS_CONSTANT_MEMORY_OBJECT_KERNEL_ARGUMENT: u32 = 31;
    pub const ALLOCATE_STATELESS_SURFACE_WITH_INITIALIZATION: u32 = 32;
    pub const ALLOCATE_STATELESS_PRINTF_SURFACE: u32 = 33;
    pub const CB_MAPPING: u32 = 34;
    pub const CB2CR_GATHER_TABLE: u32 = 35;
    pub const ALLOCATE_STATELESS_EVENT_POOL_SURFACE: u32 = 36;
    pub const NULL_SURFACE_LOCATION: u32 = 37;
    pub const ALLOCATE_STATELESS_PRIVATE_MEMORY: u32 = 38;
    pub const ALLOCATE_CONSTANT_MEMORY_SURFACE_WITH_INITIALIZATION: u32 = 39;
    pub const ALLOCATE_GLOBAL_MEMORY_SURFACE_WITH_INITIALIZATION: u32 = 40;
    pub const ALLOCATE_GLOBAL_MEMORY_SURFACE_PROGRAM_BINARY_INFO: u32 = 41;
    pub const ALLOCATE_CONSTANT_MEMORY_SURFACE_PROGRAM_BINARY_INFO: u32 = 42;
    pub const ALLOCATE_STATELESS_GLOBAL_MEMORY_SURFACE_WITH_INITIALIZATION: u32 = 43;
    pub const ALLOCATE_STATELESS_CONSTANT_MEMORY_SURFACE_WITH_INITIALIZATION: u32 = 44;
    pub const ALLOCATE_STATELESS_DEFAULT_DEVICE_QUEUE_SURFACE: u32 = 45;
    pub const STATELESS_DEVICE_QUEUE_KERNEL_ARGUMENT: u32 = 46;
    pub const GLOBAL_POINTER_PROGRAM_BINARY_INFO: u32 = 47;
    pub const CONSTANT_POINTER_PROGRAM_BINARY_INFO: u32 = 48;
    pub const CONSTRUCTOR_DESTRUCTOR_KERNEL_PROGRAM_BINARY_INFO: u32 = 49;
    pub const INLINE_VME_SAMPLER_INFO: u32 = 50;
    pub const GTPIN_FREE_GRF_INFO: u32 = 51;
    pub const GTPIN_INFO: u32 = 52;
    pub const PROGRAM_SYMBOL_TABLE: u32 = 53;
    pub const PROGRAM_RELOCATION_TABLE: u32 = 54;
    pub const MEDIA_VFE_STATE_SLOT1: u32 = 55;
    pub const ALLOCATE_SYNC_BUFFER: u32 = 56;
}

/// `DATA_PARAMETER_BUFFER` sub token types
#[allow(missing_docs)]
pub mod data_parameter {
    pub const KERNEL_ARGUMENT: u32 = 1;
    pub const LOCAL_WORK_SIZE: u32 = 2;
    pub const GLOBAL_WORK_SIZE: u32 = 3;
    pub const NUM_WORK_GROUPS: u32 = 4;
    pub const WORK_DIMENSIONS: u32 = 5;
    pub const LOCAL_ID: u32 = 6;
    pub const EXECUTION_MASK: u32 = 7;
    pub const IMAGE_WIDTH: u32 = 8;
    pub const IMAGE_HEIGHT: u32 = 9;
    pub const IMAGE_DEPTH: u32 = 10;
    pub const IMAGE_CHANNEL_DATA_TYPE: u32 = 11;
    pub const IMAGE_CHANNEL_ORDER: u32 = 12;
    pub const SAMPLER_ADDRESS_MODE: u32 = 13;
    pub const SAMPLER_NORMALIZED_COORDS: u32 = 14;
    pub const GLOBAL_WORK_OFFSET: u32 = 15;
    pub const NUM_HARDWARE_THREADS: u32 = 16;
    pub const IMAGE_ARRAY_SIZE: u32 = 17;
    pub const PRINTF_SURFACE_SIZE: u32 = 18;
    pub const IMAGE_NUM_SAMPLES: u32 = 19;
    pub const SAMPLER_COORDINATE_SNAP_WA_REQUIRED: u32 = 20;
    pub const PARENT_EVENT: u32 = 21;
    pub const VME_MB_BLOCK_TYPE: u32 = 22;
    pub const VME_SUBPIXEL_MODE: u32 = 23;
    pub const VME_SAD_ADJUST_MODE: u32 = 24;
    pub const VME_SEARCH_PATH_TYPE: u32 = 25;
    pub const IMAGE_NUM_MIP_LEVELS: u32 = 26;
    pub const ENQUEUED_LOCAL_WORK_SIZE: u32 = 27;
    pub const MAX_WORKGROUP_SIZE: u32 = 28;
    pub const PREFERRED_WORKGROUP_MULTIPLE: u32 = 29;
    pub const LOCAL_MEMORY_STATELESS_WINDOW_SIZE: u32 = 30;
    pub const LOCAL_MEMORY_STATELESS_WINDOW_START_ADDRESS: u32 = 31;
    pub const PRIVATE_MEMORY_STATELESS_SIZE: u32 = 32;
    pub const SIMD_SIZE: u32 = 33;
    pub const OBJECT_ID: u32 = 35;
    pub const VME_IMAGE_TYPE: u32 = 36;
    pub const VME_MB_SKIP_BLOCK_TYPE: u32 = 37;
    pub const CHILD_BLOCK_SIMD_SIZE: u32 = 38;
    pub const SUM_OF_LOCAL_MEMORY_OBJECT_ARGUMENT_SIZES: u32 = 39;
    pub const STAGE_IN_GRID_ORIGIN: u32 = 40;
    pub const STAGE_IN_GRID_SIZE: u32 = 41;
    pub const BUFFER_OFFSET: u32 = 42;
    pub const BUFFER_STATEFUL: u32 = 43;
    pub const IMAGE_SRGB_CHANNEL_ORDER: u32 = 44;
    pub const FLAT_IMAGE_BASEOFFSET: u32 = 45;
    pub const FLAT_IMAGE_WIDTH: u32 = 46;
    pub const FLAT_IMAGE_HEIGHT: u32 = 47;
    pub const FLAT_IMAGE_PITCH: u32 = 48;
}

/// Outcome of a decode pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DecodeStatus {
    /// Decoding has not run (or not finished)
    Undefined,
    /// The scope decoded cleanly
    Success,
    /// A bounds violation, magic mismatch or type conflict was found
    InvalidBinary,
}

impl Default for DecodeStatus {
    fn default() -> Self {
        Self::Undefined
    }
}

/// The 28 byte program binary header
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgramHeader {
    /// Must equal [`MAGIC_CL`]
    pub magic: u32,
    /// Format version
    pub version: u32,
    /// Target device (gfx core family)
    pub device: u32,
    /// GPU pointer width in bytes
    pub gpu_pointer_size_in_bytes: u32,
    /// Number of kernel records following the program patch list
    pub number_of_kernels: u32,
    /// Device stepping
    pub stepping_id: u32,
    /// Byte length of the program scope patch list
    pub patch_list_size: u32,
}

/// The 40 byte kernel binary header
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KernelHeader {
    /// Hash of the kernel blob after this header, truncated to 32 bits
    pub checksum: u32,
    /// Compiler assigned shader hash
    pub shader_hash_code: u64,
    /// Kernel name length including the terminating NUL
    pub kernel_name_size: u32,
    /// Byte length of the kernel scope patch list
    pub patch_list_size: u32,
    /// ISA heap size (padded)
    pub kernel_heap_size: u32,
    /// General state heap size
    pub general_state_heap_size: u32,
    /// Dynamic state heap size
    pub dynamic_state_heap_size: u32,
    /// Surface state heap size
    pub surface_state_heap_size: u32,
    /// ISA heap size before prefetch padding
    pub kernel_unpadded_size: u32,
}

/// One patch token record, borrowed from the patch list
///
/// `bytes` covers the whole record including the 8 byte header but not the
/// trailing inline data, which (for the two program scope inline tokens)
/// lives in `inline_data`.
#[derive(Debug, Clone, Copy)]
pub struct PatchItem<'a> {
    /// Token id
    pub token: u32,
    /// Declared record size (header included, inline data excluded)
    pub size: u32,
    /// The record bytes
    pub bytes: &'a [u8],
    /// Trailing inline data (empty for regular tokens)
    pub inline_data: &'a [u8],
}

impl<'a> PatchItem<'a> {
    /// The record bytes after the common header
    pub fn payload(&self) -> &'a [u8] {
        &self.bytes[PATCH_ITEM_HEADER_SIZE.min(self.bytes.len())..]
    }

    /// Reads the `n`-th u32 field of the payload, 0 when the record is too
    /// short to carry it
    pub fn field_u32(&self, n: usize) -> u32 {
        let payload = self.payload();
        let off = n * 4;
        if payload.len() < off + 4 {
            return 0;
        }
        u32::from_le_bytes([
            payload[off],
            payload[off + 1],
            payload[off + 2],
            payload[off + 3],
        ])
    }
}

/// A parsed `DATA_PARAMETER_BUFFER` record
#[derive(Debug, Clone, Copy)]
pub struct DataParameter<'a> {
    /// The underlying record
    pub item: PatchItem<'a>,
    /// Sub token type (see [`data_parameter`])
    pub param_type: u32,
    /// Kernel argument the parameter belongs to
    pub argument_number: u32,
    /// Destination offset in the cross thread payload
    pub offset: u32,
    /// Patched data size
    pub data_size: u32,
    /// Source offset; work item vectors use `source_offset >> 2` as the slot
    pub source_offset: u32,
    /// Opaque location index (carried, never dispatched on)
    pub location_index: u32,
    /// Opaque location index (carried, never dispatched on)
    pub location_index2: u32,
    /// Emulation argument marker
    pub is_emulation_argument: u32,
}

impl<'a> DataParameter<'a> {
    /// Parses the sub token fields out of `item`; fields beyond the record
    /// end read as 0
    pub fn parse(item: PatchItem<'a>) -> Self {
        Self {
            item,
            param_type: item.field_u32(0),
            argument_number: item.field_u32(1),
            offset: item.field_u32(2),
            data_size: item.field_u32(3),
            source_offset: item.field_u32(4),
            location_index: item.field_u32(5),
            location_index2: item.field_u32(6),
            is_emulation_argument: item.field_u32(7),
        }
    }
}

/// Kernel argument object kind inferred from its tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArgObjectType {
    /// Nothing assigned yet
    None,
    /// Buffer object
    Buffer,
    /// Image object
    Image,
    /// Sampler object
    Sampler,
    /// Shared local memory
    Slm,
}

impl Default for ArgObjectType {
    fn default() -> Self {
        Self::None
    }
}

/// Specialization orthogonal to [`ArgObjectType`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArgObjectTypeSpecialized {
    /// No specialization
    None,
    /// Video motion estimation
    Vme,
}

impl Default for ArgObjectTypeSpecialized {
    fn default() -> Self {
        Self::None
    }
}

/// Buffer argument metadata
#[derive(Debug, Clone, Copy, Default)]
pub struct BufferArgMetadata<'a> {
    /// `BUFFER_OFFSET` sub token
    pub buffer_offset: Option<DataParameter<'a>>,
    /// `BUFFER_STATEFUL` sub token
    pub pure_stateful: Option<DataParameter<'a>>,
}

/// Image argument metadata
#[derive(Debug, Clone, Copy, Default)]
#[allow(missing_docs)]
pub struct ImageArgMetadata<'a> {
    pub width: Option<DataParameter<'a>>,
    pub height: Option<DataParameter<'a>>,
    pub depth: Option<DataParameter<'a>>,
    pub channel_data_type: Option<DataParameter<'a>>,
    pub channel_order: Option<DataParameter<'a>>,
    pub array_size: Option<DataParameter<'a>>,
    pub num_samples: Option<DataParameter<'a>>,
    pub num_mip_levels: Option<DataParameter<'a>>,
    pub flat_base_offset: Option<DataParameter<'a>>,
    pub flat_width: Option<DataParameter<'a>>,
    pub flat_height: Option<DataParameter<'a>>,
    pub flat_pitch: Option<DataParameter<'a>>,
}

/// Sampler argument metadata
#[derive(Debug, Clone, Copy, Default)]
#[allow(missing_docs)]
pub struct SamplerArgMetadata<'a> {
    pub coordinate_snap_wa_required: Option<DataParameter<'a>>,
    pub address_mode: Option<DataParameter<'a>>,
    pub normalized_coords: Option<DataParameter<'a>>,
}

/// Shared local memory argument metadata
#[derive(Debug, Clone, Copy, Default)]
pub struct SlmArgMetadata<'a> {
    /// `SUM_OF_LOCAL_MEMORY_OBJECT_ARGUMENT_SIZES` sub token
    pub token: Option<DataParameter<'a>>,
}

/// Video motion estimation metadata
#[derive(Debug, Clone, Copy, Default)]
#[allow(missing_docs)]
pub struct VmeArgMetadata<'a> {
    pub mb_block_type: Option<DataParameter<'a>>,
    pub subpixel_mode: Option<DataParameter<'a>>,
    pub sad_adjust_mode: Option<DataParameter<'a>>,
    pub search_path_type: Option<DataParameter<'a>>,
}

/// One kernel argument, aggregated from its tokens
#[derive(Debug, Clone, Default)]
pub struct KernelArg<'a> {
    /// Inferred object kind
    pub object_type: ArgObjectType,
    /// Inferred specialization
    pub object_type_specialized: ArgObjectTypeSpecialized,
    /// `KERNEL_ARGUMENT_INFO` token
    pub arg_info: Option<PatchItem<'a>>,
    /// The object binding token (sampler/image/global/stateless variants)
    pub object_arg: Option<PatchItem<'a>>,
    /// `OBJECT_ID` sub token
    pub object_id: Option<DataParameter<'a>>,
    /// Buffer metadata (meaningful when the type is Buffer)
    pub buffer: BufferArgMetadata<'a>,
    /// Image metadata (meaningful when the type is Image)
    pub image: ImageArgMetadata<'a>,
    /// Sampler metadata (meaningful when the type is Sampler)
    pub sampler: SamplerArgMetadata<'a>,
    /// SLM metadata (meaningful when the type is Slm)
    pub slm: SlmArgMetadata<'a>,
    /// VME metadata (meaningful when specialized as Vme)
    pub vme: VmeArgMetadata<'a>,
    /// By-value `KERNEL_ARGUMENT` sub tokens, in source order
    pub byval_map: Vec<DataParameter<'a>>,
}

/// Kernel scope data parameters binned by meaning
#[derive(Debug, Clone, Default)]
pub struct CrossThreadPayload<'a> {
    /// Local work size vector, primary program
    pub local_work_size: [Option<DataParameter<'a>>; 3],
    /// Local work size vector, second work size program
    pub local_work_size2: [Option<DataParameter<'a>>; 3],
    /// Global work offset vector
    pub global_work_offset: [Option<DataParameter<'a>>; 3],
    /// Enqueued local work size vector
    pub enqueued_local_work_size: [Option<DataParameter<'a>>; 3],
    /// Global work size vector
    pub global_work_size: [Option<DataParameter<'a>>; 3],
    /// Work group count vector
    pub num_work_groups: [Option<DataParameter<'a>>; 3],
    /// Maximum work group size
    pub max_work_group_size: Option<DataParameter<'a>>,
    /// Work dimensions
    pub work_dimensions: Option<DataParameter<'a>>,
    /// SIMD size
    pub simd_size: Option<DataParameter<'a>>,
    /// Parent event (device enqueue)
    pub parent_event: Option<DataParameter<'a>>,
    /// Preferred work group size multiple
    pub preferred_workgroup_multiple: Option<DataParameter<'a>>,
    /// Private memory stateless size
    pub private_memory_stateless_size: Option<DataParameter<'a>>,
    /// Local memory stateless window size
    pub local_memory_stateless_window_size: Option<DataParameter<'a>>,
    /// Local memory stateless window start address
    pub local_memory_stateless_window_start_address: Option<DataParameter<'a>>,
    /// Child block SIMD sizes (device enqueue blocks), in source order
    pub child_block_simd_size: Vec<DataParameter<'a>>,
}

/// Kernel scope tokens assigned to named slots
#[derive(Debug, Clone, Default)]
#[allow(missing_docs)]
pub struct KernelTokens<'a> {
    pub sampler_state_array: Option<PatchItem<'a>>,
    pub binding_table_state: Option<PatchItem<'a>>,
    pub allocate_local_surface: Option<PatchItem<'a>>,
    pub media_vfe_state: [Option<PatchItem<'a>>; 2],
    pub media_interface_descriptor_load: Option<PatchItem<'a>>,
    pub interface_descriptor_data: Option<PatchItem<'a>>,
    pub thread_payload: Option<PatchItem<'a>>,
    pub execution_environment: Option<PatchItem<'a>>,
    pub kernel_attributes_info: Option<PatchItem<'a>>,
    pub allocate_stateless_private_surface: Option<PatchItem<'a>>,
    pub allocate_stateless_constant_memory_surface_with_initialization: Option<PatchItem<'a>>,
    pub allocate_stateless_global_memory_surface_with_initialization: Option<PatchItem<'a>>,
    pub allocate_stateless_printf_surface: Option<PatchItem<'a>>,
    pub allocate_stateless_event_pool_surface: Option<PatchItem<'a>>,
    pub allocate_stateless_default_device_queue_surface: Option<PatchItem<'a>>,
    pub allocate_sync_buffer: Option<PatchItem<'a>>,
    pub inline_vme_sampler_info: Option<PatchItem<'a>>,
    pub gtpin_free_grf_info: Option<PatchItem<'a>>,
    pub gtpin_info: Option<PatchItem<'a>>,
    pub state_sip: Option<PatchItem<'a>>,
    pub allocate_system_thread_surface: Option<PatchItem<'a>>,
    pub program_symbol_table: Option<PatchItem<'a>>,
    pub program_relocation_table: Option<PatchItem<'a>>,
    pub data_parameter_stream: Option<PatchItem<'a>>,
    /// `STRING` tokens addressed by their `Index` field
    pub strings: Vec<Option<PatchItem<'a>>>,
    /// Dense argument table addressed by argument number
    pub kernel_args: Vec<KernelArg<'a>>,
    /// Kernel scope data parameters
    pub cross_thread_payload: CrossThreadPayload<'a>,
}

/// Source ranges of one kernel record
#[derive(Debug, Clone, Copy, Default)]
pub struct KernelBlobs<'a> {
    /// The whole record: header, name, heaps and patch list
    pub kernel_info: &'a [u8],
    /// The kernel scope patch list
    pub patch_list: &'a [u8],
}

/// One decoded kernel record
#[derive(Debug, Clone, Default)]
pub struct KernelFromPatchtokens<'a> {
    /// The kernel binary header
    pub header: KernelHeader,
    /// Kernel name bytes, terminating NUL included
    pub name: &'a [u8],
    /// The ISA heap
    pub isa: &'a [u8],
    /// The general state heap
    pub general_state_heap: &'a [u8],
    /// The dynamic state heap
    pub dynamic_state_heap: &'a [u8],
    /// The surface state heap
    pub surface_state_heap: &'a [u8],
    /// Source ranges of the record
    pub blobs: KernelBlobs<'a>,
    /// Recognized tokens
    pub tokens: KernelTokens<'a>,
    /// Unrecognized or out of range tokens, preserved verbatim
    pub unhandled_tokens: Vec<PatchItem<'a>>,
    /// Decode outcome
    pub decode_status: DecodeStatus,
}

impl<'a> KernelFromPatchtokens<'a> {
    /// The kernel name as text, trailing NULs stripped
    pub fn name_str(&self) -> std::borrow::Cow<'a, str> {
        let end = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.name.len());
        String::from_utf8_lossy(&self.name[..end])
    }
}

/// Program scope tokens
#[derive(Debug, Clone, Default)]
pub struct ProgramScopeTokens<'a> {
    /// Constant memory surface infos with their inline data
    pub allocate_constant_memory_surfaces: Vec<PatchItem<'a>>,
    /// Global memory surface infos with their inline data
    pub allocate_global_memory_surfaces: Vec<PatchItem<'a>>,
    /// Global pointer relocations
    pub global_pointers: Vec<PatchItem<'a>>,
    /// Constant pointer relocations
    pub constant_pointers: Vec<PatchItem<'a>>,
    /// Program symbol table
    pub symbol_table: Option<PatchItem<'a>>,
}

/// Source ranges of the program blob
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgramBlobs<'a> {
    /// The whole device binary blob
    pub program_info: &'a [u8],
    /// The program scope patch list
    pub patch_list: &'a [u8],
    /// The run of kernel records
    pub kernels_info: &'a [u8],
}

/// The fully decoded device binary
#[derive(Debug, Clone, Default)]
pub struct ProgramFromPatchtokens<'a> {
    /// The program binary header
    pub header: ProgramHeader,
    /// Source ranges of the blob
    pub blobs: ProgramBlobs<'a>,
    /// The decoded kernel records
    pub kernels: Vec<KernelFromPatchtokens<'a>>,
    /// Program scope tokens
    pub program_scope_tokens: ProgramScopeTokens<'a>,
    /// Unrecognized program scope tokens, preserved verbatim
    pub unhandled_tokens: Vec<PatchItem<'a>>,
    /// Decode outcome
    pub decode_status: DecodeStatus,
}

/// The five variable length strings of a `KERNEL_ARGUMENT_INFO` token
#[derive(Debug, Clone, Copy, Default)]
pub struct KernelArgAttributes<'a> {
    /// e.g. `__global`
    pub address_qualifier: &'a [u8],
    /// e.g. `read_only`
    pub access_qualifier: &'a [u8],
    /// The argument name
    pub arg_name: &'a [u8],
    /// The argument type name
    pub type_name: &'a [u8],
    /// e.g. `const volatile`
    pub type_qualifiers: &'a [u8],
}
