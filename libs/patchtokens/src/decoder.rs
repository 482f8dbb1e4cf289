//! The device binary walk
//!
//! Decoding is strictly bounds checked and never copies payload bytes: the
//! produced model borrows from the input buffer. A failed check marks the
//! enclosing scope [`DecodeStatus::InvalidBinary`] and stops that scope;
//! sibling kernels with known extents are still attempted.

use crate::model::*;
use oclutils::hash;
use oclutils::io::SliceCursor;
use tracing::debug;

fn u32_at(data: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([data[off], data[off + 1], data[off + 2], data[off + 3]])
}

// callers have validated the extent; plain slicing is safe
fn cut<'a>(data: &'a [u8], off: &mut usize, len: u32) -> &'a [u8] {
    let piece = &data[*off..*off + len as usize];
    *off += len as usize;
    piece
}

fn clip<'a>(data: &'a [u8], pos: &mut usize, declared: u32) -> &'a [u8] {
    let len = (declared as usize).min(data.len() - *pos);
    let piece = &data[*pos..*pos + len];
    *pos += len;
    piece
}

// Fixed record sizes of the two inline data tokens; InlineDataSize is the
// last fixed field of each
const CONSTANT_SURFACE_INFO_SIZE: usize = 16;
const GLOBAL_SURFACE_INFO_SIZE: usize = 20;

/// Reads the record starting at `pos`, returning it together with the next
/// record's offset, or `None` on a bounds violation
fn read_item(list: &[u8], pos: usize, program_scope: bool) -> Option<(PatchItem<'_>, usize)> {
    let token = u32_at(list, pos);
    let size = u32_at(list, pos + 4) as usize;

    let mut inline_len = 0usize;
    if program_scope {
        let fixed = match token {
            token::ALLOCATE_CONSTANT_MEMORY_SURFACE_PROGRAM_BINARY_INFO => {
                Some(CONSTANT_SURFACE_INFO_SIZE)
            }
            token::ALLOCATE_GLOBAL_MEMORY_SURFACE_PROGRAM_BINARY_INFO => {
                Some(GLOBAL_SURFACE_INFO_SIZE)
            }
            _ => None,
        };
        if let Some(fixed) = fixed {
            if list.len() - pos < fixed {
                return None;
            }
            inline_len = u32_at(list, pos + fixed - 4) as usize;
        }
    }

    let total = size.checked_add(inline_len)?;
    if total == 0 || total > list.len() - pos {
        return None;
    }
    Some((
        PatchItem {
            token,
            size: size as u32,
            bytes: &list[pos..pos + size],
            inline_data: &list[pos + size..pos + total],
        },
        pos + total,
    ))
}

fn assign_in_array<'a>(
    array: &mut [Option<DataParameter<'a>>; 3],
    dp: DataParameter<'a>,
    unhandled: &mut Vec<PatchItem<'a>>,
) {
    let index = (dp.source_offset >> 2) as usize;
    if index >= array.len() {
        debug!("Unhandled data parameter source index {}", index);
        unhandled.push(dp.item);
        return;
    }
    array[index] = Some(dp);
}

/// Grows the argument table as needed and applies the object type rules:
/// the first non-None type wins, a conflicting reassignment poisons the
/// kernel, a conflicting specialization is a decoder defect
fn kernel_arg<'m, 'a>(
    out: &'m mut KernelFromPatchtokens<'a>,
    arg_num: usize,
    ty: ArgObjectType,
    specialized: ArgObjectTypeSpecialized,
) -> &'m mut KernelArg<'a> {
    let args = &mut out.tokens.kernel_args;
    if args.len() < arg_num + 1 {
        args.resize_with(arg_num + 1, Default::default);
    }
    let mut mismatched = false;
    {
        let arg = &mut args[arg_num];
        if arg.object_type == ArgObjectType::None {
            arg.object_type = ty;
        } else if arg.object_type != ty && ty != ArgObjectType::None {
            mismatched = true;
        }
        if arg.object_type_specialized == ArgObjectTypeSpecialized::None {
            arg.object_type_specialized = specialized;
        } else if specialized != ArgObjectTypeSpecialized::None {
            assert!(
                arg.object_type_specialized == specialized,
                "conflicting specialization for kernel arg {}",
                arg_num
            );
        }
    }
    if mismatched {
        debug!("Mismatched metadata for kernel arg {}", arg_num);
        out.decode_status = DecodeStatus::InvalidBinary;
    }
    &mut out.tokens.kernel_args[arg_num]
}

fn decode_data_parameter<'a>(dp: DataParameter<'a>, out: &mut KernelFromPatchtokens<'a>) {
    use ArgObjectType as Ty;
    use ArgObjectTypeSpecialized as Sp;

    let arg_num = dp.argument_number as usize;
    match dp.param_type {
        data_parameter::KERNEL_ARGUMENT => {
            kernel_arg(out, arg_num, Ty::None, Sp::None).byval_map.push(dp);
        }

        data_parameter::LOCAL_WORK_SIZE => {
            let index = (dp.source_offset >> 2) as usize;
            if index >= 3 {
                debug!("Unhandled data parameter source index {}", index);
                out.unhandled_tokens.push(dp.item);
                return;
            }
            let payload = &mut out.tokens.cross_thread_payload;
            // a second work size program stores into the shadow array
            if payload.local_work_size[index].is_none() {
                payload.local_work_size[index] = Some(dp);
            } else {
                payload.local_work_size2[index] = Some(dp);
            }
        }
        data_parameter::GLOBAL_WORK_OFFSET => {
            let payload = &mut out.tokens.cross_thread_payload;
            assign_in_array(&mut payload.global_work_offset, dp, &mut out.unhandled_tokens);
        }
        data_parameter::ENQUEUED_LOCAL_WORK_SIZE => {
            let payload = &mut out.tokens.cross_thread_payload;
            assign_in_array(
                &mut payload.enqueued_local_work_size,
                dp,
                &mut out.unhandled_tokens,
            );
        }
        data_parameter::GLOBAL_WORK_SIZE => {
            let payload = &mut out.tokens.cross_thread_payload;
            assign_in_array(&mut payload.global_work_size, dp, &mut out.unhandled_tokens);
        }
        data_parameter::NUM_WORK_GROUPS => {
            let payload = &mut out.tokens.cross_thread_payload;
            assign_in_array(&mut payload.num_work_groups, dp, &mut out.unhandled_tokens);
        }
        data_parameter::MAX_WORKGROUP_SIZE => {
            out.tokens.cross_thread_payload.max_work_group_size = Some(dp);
        }
        data_parameter::WORK_DIMENSIONS => {
            out.tokens.cross_thread_payload.work_dimensions = Some(dp);
        }
        data_parameter::SIMD_SIZE => {
            out.tokens.cross_thread_payload.simd_size = Some(dp);
        }

        data_parameter::PRIVATE_MEMORY_STATELESS_SIZE => {
            out.tokens.cross_thread_payload.private_memory_stateless_size = Some(dp);
        }
        data_parameter::LOCAL_MEMORY_STATELESS_WINDOW_SIZE => {
            out.tokens
                .cross_thread_payload
                .local_memory_stateless_window_size = Some(dp);
        }
        data_parameter::LOCAL_MEMORY_STATELESS_WINDOW_START_ADDRESS => {
            out.tokens
                .cross_thread_payload
                .local_memory_stateless_window_start_address = Some(dp);
        }

        data_parameter::OBJECT_ID => {
            kernel_arg(out, arg_num, Ty::None, Sp::None).object_id = Some(dp);
        }

        data_parameter::SUM_OF_LOCAL_MEMORY_OBJECT_ARGUMENT_SIZES => {
            let arg = kernel_arg(out, arg_num, Ty::Slm, Sp::None);
            arg.byval_map.push(dp);
            arg.slm.token = Some(dp);
        }

        data_parameter::BUFFER_OFFSET => {
            kernel_arg(out, arg_num, Ty::Buffer, Sp::None).buffer.buffer_offset = Some(dp);
        }
        data_parameter::BUFFER_STATEFUL => {
            kernel_arg(out, arg_num, Ty::Buffer, Sp::None).buffer.pure_stateful = Some(dp);
        }

        data_parameter::IMAGE_WIDTH => {
            kernel_arg(out, arg_num, Ty::Image, Sp::None).image.width = Some(dp);
        }
        data_parameter::IMAGE_HEIGHT => {
            kernel_arg(out, arg_num, Ty::Image, Sp::None).image.height = Some(dp);
        }
        data_parameter::IMAGE_DEPTH => {
            kernel_arg(out, arg_num, Ty::Image, Sp::None).image.depth = Some(dp);
        }
        data_parameter::IMAGE_CHANNEL_DATA_TYPE => {
            kernel_arg(out, arg_num, Ty::Image, Sp::None).image.channel_data_type = Some(dp);
        }
        data_parameter::IMAGE_CHANNEL_ORDER => {
            kernel_arg(out, arg_num, Ty::Image, Sp::None).image.channel_order = Some(dp);
        }
        data_parameter::IMAGE_ARRAY_SIZE => {
            kernel_arg(out, arg_num, Ty::Image, Sp::None).image.array_size = Some(dp);
        }
        data_parameter::IMAGE_NUM_SAMPLES => {
            kernel_arg(out, arg_num, Ty::Image, Sp::None).image.num_samples = Some(dp);
        }
        data_parameter::IMAGE_NUM_MIP_LEVELS => {
            kernel_arg(out, arg_num, Ty::Image, Sp::None).image.num_mip_levels = Some(dp);
        }
        data_parameter::FLAT_IMAGE_BASEOFFSET => {
            kernel_arg(out, arg_num, Ty::Image, Sp::None).image.flat_base_offset = Some(dp);
        }
        data_parameter::FLAT_IMAGE_WIDTH => {
            kernel_arg(out, arg_num, Ty::Image, Sp::None).image.flat_width = Some(dp);
        }
        data_parameter::FLAT_IMAGE_HEIGHT => {
            kernel_arg(out, arg_num, Ty::Image, Sp::None).image.flat_height = Some(dp);
        }
        data_parameter::FLAT_IMAGE_PITCH => {
            kernel_arg(out, arg_num, Ty::Image, Sp::None).image.flat_pitch = Some(dp);
        }

        data_parameter::SAMPLER_COORDINATE_SNAP_WA_REQUIRED => {
            kernel_arg(out, arg_num, Ty::Sampler, Sp::None)
                .sampler
                .coordinate_snap_wa_required = Some(dp);
        }
        data_parameter::SAMPLER_ADDRESS_MODE => {
            kernel_arg(out, arg_num, Ty::Sampler, Sp::None).sampler.address_mode = Some(dp);
        }
        data_parameter::SAMPLER_NORMALIZED_COORDS => {
            kernel_arg(out, arg_num, Ty::Sampler, Sp::None).sampler.normalized_coords = Some(dp);
        }

        data_parameter::VME_MB_BLOCK_TYPE => {
            kernel_arg(out, arg_num, Ty::None, Sp::Vme).vme.mb_block_type = Some(dp);
        }
        data_parameter::VME_SUBPIXEL_MODE => {
            kernel_arg(out, arg_num, Ty::None, Sp::Vme).vme.subpixel_mode = Some(dp);
        }
        data_parameter::VME_SAD_ADJUST_MODE => {
            kernel_arg(out, arg_num, Ty::None, Sp::Vme).vme.sad_adjust_mode = Some(dp);
        }
        data_parameter::VME_SEARCH_PATH_TYPE => {
            kernel_arg(out, arg_num, Ty::None, Sp::Vme).vme.search_path_type = Some(dp);
        }

        data_parameter::PARENT_EVENT => {
            out.tokens.cross_thread_payload.parent_event = Some(dp);
        }
        data_parameter::CHILD_BLOCK_SIMD_SIZE => {
            out.tokens.cross_thread_payload.child_block_simd_size.push(dp);
        }
        data_parameter::PREFERRED_WORKGROUP_MULTIPLE => {
            out.tokens.cross_thread_payload.preferred_workgroup_multiple = Some(dp);
        }

        // accepted with no side effect
        data_parameter::NUM_HARDWARE_THREADS
        | data_parameter::PRINTF_SURFACE_SIZE
        | data_parameter::IMAGE_SRGB_CHANNEL_ORDER
        | data_parameter::STAGE_IN_GRID_ORIGIN
        | data_parameter::STAGE_IN_GRID_SIZE
        | data_parameter::LOCAL_ID
        | data_parameter::EXECUTION_MASK
        | data_parameter::VME_IMAGE_TYPE
        | data_parameter::VME_MB_SKIP_BLOCK_TYPE => {}

        other => {
            debug!("Unhandled data parameter type {}", other);
            out.unhandled_tokens.push(dp.item);
        }
    }
}

fn decode_kernel_token<'a>(item: PatchItem<'a>, out: &mut KernelFromPatchtokens<'a>) -> bool {
    use ArgObjectType as Ty;
    use ArgObjectTypeSpecialized as Sp;

    match item.token {
        token::SAMPLER_STATE_ARRAY => out.tokens.sampler_state_array = Some(item),
        token::BINDING_TABLE_STATE => out.tokens.binding_table_state = Some(item),
        token::ALLOCATE_LOCAL_SURFACE => out.tokens.allocate_local_surface = Some(item),
        token::MEDIA_VFE_STATE => out.tokens.media_vfe_state[0] = Some(item),
        token::MEDIA_VFE_STATE_SLOT1 => out.tokens.media_vfe_state[1] = Some(item),
        token::MEDIA_INTERFACE_DESCRIPTOR_LOAD => {
            out.tokens.media_interface_descriptor_load = Some(item)
        }
        token::INTERFACE_DESCRIPTOR_DATA => out.tokens.interface_descriptor_data = Some(item),
        token::THREAD_PAYLOAD => out.tokens.thread_payload = Some(item),
        token::EXECUTION_ENVIRONMENT => out.tokens.execution_environment = Some(item),

        token::KERNEL_ATTRIBUTES_INFO => out.tokens.kernel_attributes_info = Some(item),
        token::ALLOCATE_STATELESS_PRIVATE_MEMORY => {
            out.tokens.allocate_stateless_private_surface = Some(item)
        }
        token::ALLOCATE_STATELESS_CONSTANT_MEMORY_SURFACE_WITH_INITIALIZATION => {
            out.tokens
                .allocate_stateless_constant_memory_surface_with_initialization = Some(item)
        }
        token::ALLOCATE_STATELESS_GLOBAL_MEMORY_SURFACE_WITH_INITIALIZATION => {
            out.tokens
                .allocate_stateless_global_memory_surface_with_initialization = Some(item)
        }
        token::ALLOCATE_STATELESS_PRINTF_SURFACE => {
            out.tokens.allocate_stateless_printf_surface = Some(item)
        }
        token::ALLOCATE_STATELESS_EVENT_POOL_SURFACE => {
            out.tokens.allocate_stateless_event_pool_surface = Some(item)
        }
        token::ALLOCATE_STATELESS_DEFAULT_DEVICE_QUEUE_SURFACE => {
            out.tokens.allocate_stateless_default_device_queue_surface = Some(item)
        }
        token::ALLOCATE_SYNC_BUFFER => out.tokens.allocate_sync_buffer = Some(item),
        token::STRING => {
            let index = item.field_u32(0) as usize;
            if out.tokens.strings.len() < index + 1 {
                out.tokens.strings.resize(index + 1, None);
            }
            out.tokens.strings[index] = Some(item);
        }
        token::INLINE_VME_SAMPLER_INFO => out.tokens.inline_vme_sampler_info = Some(item),
        token::GTPIN_FREE_GRF_INFO => out.tokens.gtpin_free_grf_info = Some(item),
        token::GTPIN_INFO => out.tokens.gtpin_info = Some(item),
        token::STATE_SIP => out.tokens.state_sip = Some(item),
        token::ALLOCATE_SIP_SURFACE => out.tokens.allocate_system_thread_surface = Some(item),
        token::PROGRAM_SYMBOL_TABLE => out.tokens.program_symbol_table = Some(item),
        token::PROGRAM_RELOCATION_TABLE => out.tokens.program_relocation_table = Some(item),

        token::KERNEL_ARGUMENT_INFO => {
            let arg_num = item.field_u32(0) as usize;
            kernel_arg(out, arg_num, Ty::None, Sp::None).arg_info = Some(item);
        }

        token::SAMPLER_KERNEL_ARGUMENT
        | token::IMAGE_MEMORY_OBJECT_KERNEL_ARGUMENT
        | token::GLOBAL_MEMORY_OBJECT_KERNEL_ARGUMENT
        | token::STATELESS_GLOBAL_MEMORY_OBJECT_KERNEL_ARGUMENT
        | token::STATELESS_CONSTANT_MEMORY_OBJECT_KERNEL_ARGUMENT
        | token::STATELESS_DEVICE_QUEUE_KERNEL_ARGUMENT => {
            // ArgumentNumber is the first payload field of every object
            // argument token kind
            let arg_num = item.field_u32(0) as usize;
            let ty = match item.token {
                token::SAMPLER_KERNEL_ARGUMENT => Ty::Sampler,
                token::IMAGE_MEMORY_OBJECT_KERNEL_ARGUMENT => Ty::Image,
                _ => Ty::Buffer,
            };
            kernel_arg(out, arg_num, ty, Sp::None).object_arg = Some(item);
        }

        token::DATA_PARAMETER_STREAM => out.tokens.data_parameter_stream = Some(item),
        token::DATA_PARAMETER_BUFFER => {
            decode_data_parameter(DataParameter::parse(item), out);
        }

        other => {
            debug!("Unknown kernel-scope patch token {}", other);
            out.unhandled_tokens.push(item);
        }
    }

    out.decode_status != DecodeStatus::InvalidBinary
}

fn decode_program_token<'a>(item: PatchItem<'a>, out: &mut ProgramFromPatchtokens<'a>) -> bool {
    let scope = &mut out.program_scope_tokens;
    match item.token {
        token::ALLOCATE_CONSTANT_MEMORY_SURFACE_PROGRAM_BINARY_INFO => {
            scope.allocate_constant_memory_surfaces.push(item)
        }
        token::ALLOCATE_GLOBAL_MEMORY_SURFACE_PROGRAM_BINARY_INFO => {
            scope.allocate_global_memory_surfaces.push(item)
        }
        token::GLOBAL_POINTER_PROGRAM_BINARY_INFO => scope.global_pointers.push(item),
        token::CONSTANT_POINTER_PROGRAM_BINARY_INFO => scope.constant_pointers.push(item),
        token::PROGRAM_SYMBOL_TABLE => scope.symbol_table = Some(item),
        other => {
            debug!("Unknown program-scope patch token {}", other);
            out.unhandled_tokens.push(item);
        }
    }
    true
}

fn decode_kernel_patch_list<'a>(list: &'a [u8], out: &mut KernelFromPatchtokens<'a>) -> bool {
    let mut pos = 0usize;
    while pos + PATCH_ITEM_HEADER_SIZE <= list.len() {
        match read_item(list, pos, false) {
            Some((item, next)) => {
                if !decode_kernel_token(item, out) {
                    return false;
                }
                pos = next;
            }
            None => return false,
        }
    }
    true
}

fn decode_program_patch_list<'a>(list: &'a [u8], out: &mut ProgramFromPatchtokens<'a>) -> bool {
    let mut pos = 0usize;
    while pos + PATCH_ITEM_HEADER_SIZE <= list.len() {
        match read_item(list, pos, true) {
            Some((item, next)) => {
                if !decode_program_token(item, out) {
                    return false;
                }
                pos = next;
            }
            None => return false,
        }
    }
    true
}

fn parse_kernel_header(cur: &mut SliceCursor) -> KernelHeader {
    // callers guarantee 40 bytes are available
    KernelHeader {
        checksum: cur.rdu32().expect("header size was checked"),
        shader_hash_code: cur.rdu64().expect("header size was checked"),
        kernel_name_size: cur.rdu32().expect("header size was checked"),
        patch_list_size: cur.rdu32().expect("header size was checked"),
        kernel_heap_size: cur.rdu32().expect("header size was checked"),
        general_state_heap_size: cur.rdu32().expect("header size was checked"),
        dynamic_state_heap_size: cur.rdu32().expect("header size was checked"),
        surface_state_heap_size: cur.rdu32().expect("header size was checked"),
        kernel_unpadded_size: cur.rdu32().expect("header size was checked"),
    }
}

/// Decodes one kernel record found at the start of `data`
///
/// On success the record's extent is available as
/// `blobs.kernel_info.len()`; an empty `kernel_info` means the extent could
/// not be established (truncated header or declared sizes exceeding the
/// buffer).
pub fn decode_kernel(data: &[u8]) -> KernelFromPatchtokens<'_> {
    let mut out = KernelFromPatchtokens::default();
    if data.len() < KERNEL_BINARY_HEADER_SIZE {
        out.decode_status = DecodeStatus::InvalidBinary;
        return out;
    }
    let mut cur = SliceCursor::new(data);
    let header = parse_kernel_header(&mut cur);

    let blob_size = KERNEL_BINARY_HEADER_SIZE as u64
        + u64::from(header.kernel_name_size)
        + u64::from(header.kernel_heap_size)
        + u64::from(header.general_state_heap_size)
        + u64::from(header.dynamic_state_heap_size)
        + u64::from(header.surface_state_heap_size)
        + u64::from(header.patch_list_size);
    if blob_size > data.len() as u64 {
        out.header = header;
        out.decode_status = DecodeStatus::InvalidBinary;
        return out;
    }
    let blob_size = blob_size as usize;

    out.header = header;
    out.blobs.kernel_info = &data[..blob_size];

    let mut off = KERNEL_BINARY_HEADER_SIZE;
    out.name = cut(data, &mut off, header.kernel_name_size);
    out.isa = cut(data, &mut off, header.kernel_heap_size);
    out.general_state_heap = cut(data, &mut off, header.general_state_heap_size);
    out.dynamic_state_heap = cut(data, &mut off, header.dynamic_state_heap_size);
    out.surface_state_heap = cut(data, &mut off, header.surface_state_heap_size);
    out.blobs.patch_list = cut(data, &mut off, header.patch_list_size);

    if decode_kernel_patch_list(out.blobs.patch_list, &mut out) {
        if out.decode_status == DecodeStatus::Undefined {
            out.decode_status = DecodeStatus::Success;
        }
    } else {
        out.decode_status = DecodeStatus::InvalidBinary;
    }
    out
}

/// Decodes a whole device binary blob
pub fn decode_program(blob: &[u8]) -> ProgramFromPatchtokens<'_> {
    let mut out = ProgramFromPatchtokens::default();
    out.blobs.program_info = blob;

    if blob.len() < PROGRAM_BINARY_HEADER_SIZE {
        out.decode_status = DecodeStatus::InvalidBinary;
        return out;
    }
    let mut cur = SliceCursor::new(blob);
    let header = ProgramHeader {
        magic: cur.rdu32().expect("header size was checked"),
        version: cur.rdu32().expect("header size was checked"),
        device: cur.rdu32().expect("header size was checked"),
        gpu_pointer_size_in_bytes: cur.rdu32().expect("header size was checked"),
        number_of_kernels: cur.rdu32().expect("header size was checked"),
        stepping_id: cur.rdu32().expect("header size was checked"),
        patch_list_size: cur.rdu32().expect("header size was checked"),
    };
    out.header = header;
    if header.magic != MAGIC_CL {
        out.decode_status = DecodeStatus::InvalidBinary;
        return out;
    }

    let patch_list_end = PROGRAM_BINARY_HEADER_SIZE as u64 + u64::from(header.patch_list_size);
    if patch_list_end > blob.len() as u64 {
        out.decode_status = DecodeStatus::InvalidBinary;
        return out;
    }
    let patch_list_end = patch_list_end as usize;
    out.blobs.patch_list = &blob[PROGRAM_BINARY_HEADER_SIZE..patch_list_end];
    out.blobs.kernels_info = &blob[patch_list_end..];

    let mut success = true;
    let kernels_info = out.blobs.kernels_info;
    let mut pos = 0usize;
    for _ in 0..header.number_of_kernels {
        let kernel = decode_kernel(&kernels_info[pos..]);
        let extent = kernel.blobs.kernel_info.len();
        if kernel.decode_status != DecodeStatus::Success {
            success = false;
        }
        out.kernels.push(kernel);
        if extent == 0 {
            // the next record's offset is unknowable
            break;
        }
        pos += extent;
    }

    success &= decode_program_patch_list(out.blobs.patch_list, &mut out);

    out.decode_status = if success {
        DecodeStatus::Success
    } else {
        DecodeStatus::InvalidBinary
    };
    out
}

/// Computes the checksum of a kernel record: the hash of everything after
/// the 40 byte header, truncated to 32 bits
///
/// Panics when `kernel_blob` is not longer than the header (a caller bug,
/// as such a record cannot exist)
pub fn calc_kernel_checksum(kernel_blob: &[u8]) -> u32 {
    assert!(
        kernel_blob.len() > KERNEL_BINARY_HEADER_SIZE,
        "kernel blob carries no data past the header"
    );
    hash::checksum(&kernel_blob[KERNEL_BINARY_HEADER_SIZE..])
}

/// Returns [true] when the stored checksum disagrees with the recomputed one
pub fn has_invalid_checksum(kernel: &KernelFromPatchtokens) -> bool {
    kernel.header.checksum != calc_kernel_checksum(kernel.blobs.kernel_info)
}

/// Extracts the five inline strings of a `KERNEL_ARGUMENT_INFO` token
///
/// Declared lengths overflowing the record are clipped to its end rather
/// than reported as an error.
pub fn kernel_arg_attributes<'a>(item: &PatchItem<'a>) -> KernelArgAttributes<'a> {
    // header (8) + ArgumentNumber + five length fields
    const STRINGS_OFFSET: usize = 32;
    let bytes = item.bytes;
    let mut pos = STRINGS_OFFSET.min(bytes.len());
    KernelArgAttributes {
        address_qualifier: clip(bytes, &mut pos, item.field_u32(1)),
        access_qualifier: clip(bytes, &mut pos, item.field_u32(2)),
        arg_name: clip(bytes, &mut pos, item.field_u32(3)),
        type_name: clip(bytes, &mut pos, item.field_u32(4)),
        type_qualifiers: clip(bytes, &mut pos, item.field_u32(5)),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn wr32(out: &mut Vec<u8>, val: u32) {
        out.extend_from_slice(&val.to_le_bytes());
    }

    fn wr64(out: &mut Vec<u8>, val: u64) {
        out.extend_from_slice(&val.to_le_bytes());
    }

    fn program_header(number_of_kernels: u32, patch_list_size: u32) -> Vec<u8> {
        let mut out = Vec::new();
        wr32(&mut out, MAGIC_CL);
        wr32(&mut out, 0); // Version
        wr32(&mut out, 0); // Device
        wr32(&mut out, 0); // GPUPointerSizeInBytes
        wr32(&mut out, number_of_kernels);
        wr32(&mut out, 0); // SteppingId
        wr32(&mut out, patch_list_size);
        out
    }

    fn kernel_header(kernel_name_size: u32, patch_list_size: u32) -> Vec<u8> {
        let mut out = Vec::new();
        wr32(&mut out, 0xffffffff); // CheckSum
        wr64(&mut out, 0xffffffffffffffff); // ShaderHashCode
        wr32(&mut out, kernel_name_size);
        wr32(&mut out, patch_list_size);
        wr32(&mut out, 0); // KernelHeapSize
        wr32(&mut out, 0); // GeneralStateHeapSize
        wr32(&mut out, 0); // DynamicStateHeapSize
        wr32(&mut out, 0); // SurfaceStateHeapSize
        wr32(&mut out, 0); // KernelUnpaddedSize
        out
    }

    fn patch_item(token: u32, payload: &[u32]) -> Vec<u8> {
        let mut out = Vec::new();
        wr32(&mut out, token);
        wr32(&mut out, 8 + 4 * payload.len() as u32);
        for &field in payload {
            wr32(&mut out, field);
        }
        out
    }

    fn data_parameter(param_type: u32, argument_number: u32, source_offset: u32) -> Vec<u8> {
        patch_item(
            token::DATA_PARAMETER_BUFFER,
            &[param_type, argument_number, 0, 4, source_offset, 0, 0, 0],
        )
    }

    #[test]
    fn minimal_program() {
        let mut bin = program_header(1, 0);
        bin.extend(kernel_header(14, 0));
        bin.extend(b"ExampleKernel\0");

        let program = decode_program(&bin);
        assert_eq!(program.decode_status, DecodeStatus::Success);
        assert_eq!(program.header.number_of_kernels, 1);
        assert_eq!(program.kernels.len(), 1);
        let kernel = &program.kernels[0];
        assert_eq!(kernel.decode_status, DecodeStatus::Success);
        assert_eq!(kernel.name_str(), "ExampleKernel");
        assert_eq!(kernel.header.kernel_name_size, 14);
        assert_eq!(kernel.blobs.kernel_info.len(), 40 + 14);
        assert!(kernel.tokens.kernel_args.is_empty());
    }

    #[test]
    fn zero_kernels() {
        let bin = program_header(0, 0);
        let program = decode_program(&bin);
        assert_eq!(program.decode_status, DecodeStatus::Success);
        assert!(program.kernels.is_empty());
    }

    #[test]
    fn bad_magic() {
        let mut bin = program_header(0, 0);
        bin[0] = 0;
        let program = decode_program(&bin);
        assert_eq!(program.decode_status, DecodeStatus::InvalidBinary);
    }

    #[test]
    fn truncated_header() {
        let bin = program_header(0, 0);
        let program = decode_program(&bin[..27]);
        assert_eq!(program.decode_status, DecodeStatus::InvalidBinary);
    }

    #[test]
    fn truncated_kernel() {
        let mut bin = program_header(1, 0);
        bin.extend(kernel_header(14, 0));
        bin.extend(b"ExampleKernel"); // one byte short of the declared 14
        let program = decode_program(&bin);
        assert_eq!(program.decode_status, DecodeStatus::InvalidBinary);
    }

    #[test]
    fn program_scope_inline_data() {
        // constant surface info: size 16, 14 bytes of inline data
        let mut list = Vec::new();
        wr32(
            &mut list,
            token::ALLOCATE_CONSTANT_MEMORY_SURFACE_PROGRAM_BINARY_INFO,
        );
        wr32(&mut list, 16);
        wr32(&mut list, 0); // ConstantBufferIndex
        wr32(&mut list, 14); // InlineDataSize
        list.extend(0u8..14);

        let mut bin = program_header(1, list.len() as u32);
        bin.extend(&list);
        bin.extend(kernel_header(14, 0));
        bin.extend(b"ExampleKernel\0");

        let program = decode_program(&bin);
        assert_eq!(program.decode_status, DecodeStatus::Success);
        let surfaces = &program.program_scope_tokens.allocate_constant_memory_surfaces;
        assert_eq!(surfaces.len(), 1);
        assert_eq!(surfaces[0].size, 16);
        assert_eq!(surfaces[0].inline_data, (0u8..14).collect::<Vec<_>>());
    }

    #[test]
    fn inline_data_overflow_is_invalid() {
        let mut list = Vec::new();
        wr32(
            &mut list,
            token::ALLOCATE_CONSTANT_MEMORY_SURFACE_PROGRAM_BINARY_INFO,
        );
        wr32(&mut list, 16);
        wr32(&mut list, 0);
        wr32(&mut list, 14); // declares 14 inline bytes, provides none

        let mut bin = program_header(0, list.len() as u32);
        bin.extend(&list);
        let program = decode_program(&bin);
        assert_eq!(program.decode_status, DecodeStatus::InvalidBinary);
    }

    #[test]
    fn kernel_slot_tokens() {
        let mut list = patch_item(token::MEDIA_INTERFACE_DESCRIPTOR_LOAD, &[0]);
        list.extend(patch_item(token::THREAD_PAYLOAD, &[1, 2, 3]));
        list.extend(patch_item(token::MEDIA_VFE_STATE, &[0, 0]));
        list.extend(patch_item(token::MEDIA_VFE_STATE_SLOT1, &[0, 1]));

        let mut bin = program_header(1, 0);
        bin.extend(kernel_header(14, list.len() as u32));
        bin.extend(b"ExampleKernel\0");
        bin.extend(&list);

        let program = decode_program(&bin);
        assert_eq!(program.decode_status, DecodeStatus::Success);
        let kernel = &program.kernels[0];
        let tokens = &kernel.tokens;
        assert!(tokens.media_interface_descriptor_load.is_some());
        assert!(tokens.thread_payload.is_some());
        assert!(tokens.media_vfe_state[0].is_some());
        assert!(tokens.media_vfe_state[1].is_some());
        assert_eq!(tokens.media_vfe_state[1].unwrap().field_u32(1), 1);
        assert!(kernel.unhandled_tokens.is_empty());
    }

    #[test]
    fn walk_consumes_patch_list_exactly() {
        let mut list = patch_item(token::THREAD_PAYLOAD, &[0; 4]);
        list.extend(patch_item(0xdead, &[0; 2])); // unknown token
        let mut bin = program_header(1, 0);
        bin.extend(kernel_header(2, list.len() as u32));
        bin.extend(b"k\0");
        bin.extend(&list);

        let program = decode_program(&bin);
        assert_eq!(program.decode_status, DecodeStatus::Success);
        let kernel = &program.kernels[0];
        let consumed: usize = kernel
            .tokens
            .thread_payload
            .iter()
            .chain(kernel.unhandled_tokens.iter())
            .map(|item| item.bytes.len() + item.inline_data.len())
            .sum();
        assert_eq!(consumed, kernel.header.patch_list_size as usize);
    }

    #[test]
    fn unknown_token_is_preserved() {
        let list = patch_item(0xbeef, &[7, 8, 9]);
        let mut bin = program_header(1, 0);
        bin.extend(kernel_header(2, list.len() as u32));
        bin.extend(b"k\0");
        bin.extend(&list);

        let program = decode_program(&bin);
        assert_eq!(program.decode_status, DecodeStatus::Success);
        let kernel = &program.kernels[0];
        assert_eq!(kernel.unhandled_tokens.len(), 1);
        assert_eq!(kernel.unhandled_tokens[0].token, 0xbeef);
        assert_eq!(kernel.unhandled_tokens[0].bytes.len(), 20);
    }

    #[test]
    fn truncated_token_is_invalid() {
        let mut list = patch_item(token::THREAD_PAYLOAD, &[0; 4]);
        list.pop(); // last byte missing
        let mut bin = program_header(1, 0);
        bin.extend(kernel_header(2, list.len() as u32));
        bin.extend(b"k\0");
        bin.extend(&list);

        let program = decode_program(&bin);
        assert_eq!(program.decode_status, DecodeStatus::InvalidBinary);
        assert_eq!(
            program.kernels[0].decode_status,
            DecodeStatus::InvalidBinary
        );
    }

    #[test]
    fn sibling_kernel_still_decoded_after_patch_walk_failure() {
        let mut bad_list = patch_item(token::THREAD_PAYLOAD, &[0; 4]);
        bad_list[4] = 0xff; // declared token size far beyond the list
        let mut bin = program_header(2, 0);
        bin.extend(kernel_header(2, bad_list.len() as u32));
        bin.extend(b"a\0");
        bin.extend(&bad_list);
        bin.extend(kernel_header(2, 0));
        bin.extend(b"b\0");

        let program = decode_program(&bin);
        assert_eq!(program.decode_status, DecodeStatus::InvalidBinary);
        assert_eq!(program.kernels.len(), 2);
        assert_eq!(program.kernels[0].decode_status, DecodeStatus::InvalidBinary);
        assert_eq!(program.kernels[1].decode_status, DecodeStatus::Success);
        assert_eq!(program.kernels[1].name_str(), "b");
    }

    #[test]
    fn argument_aggregation() {
        // image arg 1 via object token, byval arg 0, image metadata for 1
        let mut list = patch_item(
            token::IMAGE_MEMORY_OBJECT_KERNEL_ARGUMENT,
            &[1, 0x40, 0, 0],
        );
        list.extend(data_parameter(data_parameter::KERNEL_ARGUMENT, 0, 0));
        list.extend(data_parameter(data_parameter::IMAGE_WIDTH, 1, 0));

        let mut bin = program_header(1, 0);
        bin.extend(kernel_header(2, list.len() as u32));
        bin.extend(b"k\0");
        bin.extend(&list);

        let program = decode_program(&bin);
        assert_eq!(program.decode_status, DecodeStatus::Success);
        let args = &program.kernels[0].tokens.kernel_args;
        assert_eq!(args.len(), 2);
        assert_eq!(args[0].object_type, ArgObjectType::None);
        assert_eq!(args[0].byval_map.len(), 1);
        assert_eq!(args[1].object_type, ArgObjectType::Image);
        assert!(args[1].object_arg.is_some());
        assert!(args[1].image.width.is_some());
    }

    #[test]
    fn argument_type_conflict_poisons_the_kernel() {
        let mut list = data_parameter(data_parameter::BUFFER_OFFSET, 0, 0);
        list.extend(data_parameter(data_parameter::IMAGE_WIDTH, 0, 0));

        let mut bin = program_header(1, 0);
        bin.extend(kernel_header(2, list.len() as u32));
        bin.extend(b"k\0");
        bin.extend(&list);

        let program = decode_program(&bin);
        assert_eq!(program.decode_status, DecodeStatus::InvalidBinary);
        assert_eq!(
            program.kernels[0].decode_status,
            DecodeStatus::InvalidBinary
        );
    }

    #[test]
    fn local_work_size_second_program() {
        let mut list = data_parameter(data_parameter::LOCAL_WORK_SIZE, 0, 0);
        list.extend(data_parameter(data_parameter::LOCAL_WORK_SIZE, 0, 4));
        list.extend(data_parameter(data_parameter::LOCAL_WORK_SIZE, 0, 0));

        let mut bin = program_header(1, 0);
        bin.extend(kernel_header(2, list.len() as u32));
        bin.extend(b"k\0");
        bin.extend(&list);

        let program = decode_program(&bin);
        let payload = &program.kernels[0].tokens.cross_thread_payload;
        assert!(payload.local_work_size[0].is_some());
        assert!(payload.local_work_size[1].is_some());
        assert!(payload.local_work_size2[0].is_some());
        assert!(payload.local_work_size2[1].is_none());
    }

    #[test]
    fn out_of_range_source_index_goes_unhandled() {
        let list = data_parameter(data_parameter::GLOBAL_WORK_OFFSET, 0, 12);
        let mut bin = program_header(1, 0);
        bin.extend(kernel_header(2, list.len() as u32));
        bin.extend(b"k\0");
        bin.extend(&list);

        let program = decode_program(&bin);
        assert_eq!(program.decode_status, DecodeStatus::Success);
        let kernel = &program.kernels[0];
        assert!(kernel
            .tokens
            .cross_thread_payload
            .global_work_offset
            .iter()
            .all(|slot| slot.is_none()));
        assert_eq!(kernel.unhandled_tokens.len(), 1);
    }

    #[test]
    fn ignored_data_parameters_have_no_side_effect() {
        let mut list = data_parameter(data_parameter::NUM_HARDWARE_THREADS, 0, 0);
        list.extend(data_parameter(data_parameter::PRINTF_SURFACE_SIZE, 0, 0));
        list.extend(data_parameter(data_parameter::LOCAL_ID, 0, 0));
        let mut bin = program_header(1, 0);
        bin.extend(kernel_header(2, list.len() as u32));
        bin.extend(b"k\0");
        bin.extend(&list);

        let program = decode_program(&bin);
        assert_eq!(program.decode_status, DecodeStatus::Success);
        let kernel = &program.kernels[0];
        assert!(kernel.unhandled_tokens.is_empty());
        assert!(kernel.tokens.kernel_args.is_empty());
    }

    #[test]
    fn checksum_validation() {
        let name = b"ExampleKernel\0";
        let mut kernel = kernel_header(name.len() as u32, 0);
        kernel.extend(name);
        // patch the stored checksum with the true value
        let expected = oclutils::hash::checksum(name);
        kernel[0..4].copy_from_slice(&expected.to_le_bytes());

        let mut bin = program_header(1, 0);
        bin.extend(&kernel);
        let program = decode_program(&bin);
        let decoded = &program.kernels[0];
        assert!(!has_invalid_checksum(decoded));
        assert_eq!(calc_kernel_checksum(decoded.blobs.kernel_info), expected);

        // flip one blob byte and the stored value no longer matches
        let mut tampered = bin.clone();
        let last = tampered.len() - 1;
        tampered[last] ^= 0x55;
        let program = decode_program(&tampered);
        assert!(has_invalid_checksum(&program.kernels[0]));
    }

    #[test]
    fn arg_info_inline_strings() {
        // ArgumentNumber 0, qualifiers "__global", "none", name "src",
        // type "int*", no type qualifiers
        let strings = b"__globalnonesrcint*";
        let mut item_bytes = Vec::new();
        wr32(&mut item_bytes, token::KERNEL_ARGUMENT_INFO);
        wr32(&mut item_bytes, 32 + strings.len() as u32);
        for field in [0u32, 8, 4, 3, 4, 0] {
            wr32(&mut item_bytes, field);
        }
        item_bytes.extend_from_slice(strings);

        let item = PatchItem {
            token: token::KERNEL_ARGUMENT_INFO,
            size: item_bytes.len() as u32,
            bytes: &item_bytes,
            inline_data: &[],
        };
        let attrs = kernel_arg_attributes(&item);
        assert_eq!(attrs.address_qualifier, b"__global");
        assert_eq!(attrs.access_qualifier, b"none");
        assert_eq!(attrs.arg_name, b"src");
        assert_eq!(attrs.type_name, b"int*");
        assert_eq!(attrs.type_qualifiers, b"");
    }

    #[test]
    fn arg_info_overflowing_lengths_are_clipped() {
        let mut item_bytes = Vec::new();
        wr32(&mut item_bytes, token::KERNEL_ARGUMENT_INFO);
        wr32(&mut item_bytes, 36);
        for field in [0u32, 1000, 1000, 1000, 1000, 1000] {
            wr32(&mut item_bytes, field);
        }
        item_bytes.extend_from_slice(b"abcd");

        let item = PatchItem {
            token: token::KERNEL_ARGUMENT_INFO,
            size: 36,
            bytes: &item_bytes,
            inline_data: &[],
        };
        let attrs = kernel_arg_attributes(&item);
        assert_eq!(attrs.address_qualifier, b"abcd");
        assert_eq!(attrs.access_qualifier, b"");
        assert_eq!(attrs.arg_name, b"");
        assert_eq!(attrs.type_name, b"");
        assert_eq!(attrs.type_qualifiers, b"");
    }
}
