use devbin_rs::asm::Encoder;
use devbin_rs::disasm::Disassembler;
use devbin_rs::CodecError;
use oclelf::{sh_type, Elf};
use patchtokens::model::{KernelHeader, ProgramHeader, KERNEL_BINARY_HEADER_SIZE};
use patchtokens::{decode_program, has_invalid_checksum, DecodeStatus};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
#[allow(unused_imports)]
use tracing::{debug, error, info, warn};
use tracing_subscriber::prelude::*;

fn usage() {
    eprintln!("Disassembles and reassembles Intel OpenCL GPU device binaries.");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  devbin-rs disasm -file <binary.bin> [-patch <dir>] -dump <dir>");
    eprintln!("  devbin-rs asm -out <binary.bin> [-dump <dir>] [-device <type>] [-ignore_isa_padding]");
    eprintln!("  devbin-rs info <binary.bin>");
    eprintln!();
    eprintln!("See 'devbin-rs <command> --help' for details.");
}

fn disasm_usage() {
    eprintln!("Disassembles an Intel OpenCL GPU device binary into a dump directory.");
    eprintln!();
    eprintln!("Usage: devbin-rs disasm -file <binary.bin> [-patch <dir>] -dump <dir>");
    eprintln!("  -file <binary.bin>   OpenCL ELF binary file to disassemble.");
    eprintln!("  -patch <dir>         Directory with the patch list headers");
    eprintln!("                       (patch_list.h and friends); without it");
    eprintln!("                       patch tokens dump as raw hex.");
    eprintln!("  -dump <dir>          Output directory for the side files.");
    eprintln!();
    eprintln!("e.g. devbin-rs disasm -file my_binary.bin -patch igc/inc -dump dump");
}

fn asm_usage() {
    eprintln!("Assembles an Intel OpenCL GPU device binary from a dump directory.");
    eprintln!("The input files are expected to match the 'disasm' output naming scheme.");
    eprintln!();
    eprintln!("Usage: devbin-rs asm -out <out_file> [-dump <dir>] [-device <type>] [-ignore_isa_padding]");
    eprintln!("  -out <out_file>      Filename for the newly assembled binary.");
    eprintln!("  -dump <dir>          Input directory with the disassembled");
    eprintln!("                       binary. Default is './dump'.");
    eprintln!("  -device <type>       Optional target device of the output binary.");
    eprintln!("  -ignore_isa_padding  Do not pad the kernel heap.");
    eprintln!();
    eprintln!("e.g. devbin-rs asm -out reassembled.bin");
}

fn usage_error(msg: impl Into<String>) -> CodecError {
    CodecError::Internal(msg.into())
}

fn run_disasm(args: &[String]) -> Result<(), CodecError> {
    if args.last().map(String::as_str) == Some("--help") {
        disasm_usage();
        return Ok(());
    }
    let mut binary_file: Option<PathBuf> = None;
    let mut path_to_patch: Option<PathBuf> = None;
    let mut path_to_dump: Option<PathBuf> = None;

    let mut it = args.iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-file" => {
                binary_file = Some(
                    it.next()
                        .ok_or_else(|| usage_error("-file needs a value"))?
                        .into(),
                )
            }
            "-patch" => {
                path_to_patch = Some(
                    it.next()
                        .ok_or_else(|| usage_error("-patch needs a value"))?
                        .into(),
                )
            }
            "-dump" => {
                path_to_dump = Some(
                    it.next()
                        .ok_or_else(|| usage_error("-dump needs a value"))?
                        .into(),
                )
            }
            other => {
                disasm_usage();
                return Err(usage_error(format!("Unknown argument {}", other)));
            }
        }
    }

    let binary_file = match binary_file {
        Some(file) if file.to_string_lossy().contains(".bin") => file,
        _ => {
            disasm_usage();
            return Err(usage_error(".bin extension is expected for binary file"));
        }
    };
    let Some(path_to_dump) = path_to_dump else {
        disasm_usage();
        return Err(usage_error("Path to dump folder can't be empty"));
    };

    Disassembler::new(binary_file, path_to_patch.as_deref(), path_to_dump)?.decode()
}

fn run_asm(args: &[String]) -> Result<(), CodecError> {
    if args.last().map(String::as_str) == Some("--help") {
        asm_usage();
        return Ok(());
    }
    let mut path_to_dump: Option<PathBuf> = None;
    let mut elf_name: Option<PathBuf> = None;
    let mut device: Option<String> = None;
    let mut ignore_isa_padding = false;

    let mut it = args.iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-dump" => {
                path_to_dump = Some(
                    it.next()
                        .ok_or_else(|| usage_error("-dump needs a value"))?
                        .into(),
                )
            }
            "-device" => {
                device = Some(
                    it.next()
                        .ok_or_else(|| usage_error("-device needs a value"))?
                        .clone(),
                )
            }
            "-out" => {
                elf_name = Some(
                    it.next()
                        .ok_or_else(|| usage_error("-out needs a value"))?
                        .into(),
                )
            }
            "-ignore_isa_padding" => ignore_isa_padding = true,
            other => {
                asm_usage();
                return Err(usage_error(format!("Unknown argument {}", other)));
            }
        }
    }

    let path_to_dump = path_to_dump.unwrap_or_else(|| {
        warn!("Path to dump folder not specified - using ./dump as default");
        PathBuf::from("dump")
    });
    let elf_name = match elf_name {
        Some(name) if name.to_string_lossy().contains(".bin") => name,
        _ => {
            asm_usage();
            return Err(usage_error(".bin extension is expected for binary file"));
        }
    };

    let mut encoder = Encoder::new(path_to_dump, elf_name).ignore_isa_padding(ignore_isa_padding);
    let device_known = match device {
        Some(name) => encoder.set_device(&name),
        None => false,
    };
    if !device_known {
        warn!("Missing or invalid -device parameter - results may be inaccurate");
    }
    encoder.encode()
}

#[derive(Serialize)]
struct KernelReport {
    name: String,
    decode_status: DecodeStatus,
    header: KernelHeader,
    checksum_ok: bool,
    unhandled_tokens: usize,
}

#[derive(Serialize)]
struct ProgramReport {
    decode_status: DecodeStatus,
    header: ProgramHeader,
    kernels: Vec<KernelReport>,
}

fn run_info(args: &[String]) -> Result<(), CodecError> {
    let [path] = args else {
        usage();
        return Err(usage_error("info expects exactly one file"));
    };
    let binary = std::fs::read(path).map_err(|e| CodecError::io(path, e))?;
    let elf =
        Elf::parse(&binary).map_err(|e| CodecError::InvalidBinary(e.to_string()))?;

    let program = elf
        .find_section(sh_type::OPENCL_DEV_BINARY)
        .map(|section| decode_program(elf.section_data(section)))
        .map(|program| ProgramReport {
            decode_status: program.decode_status,
            header: program.header,
            kernels: program
                .kernels
                .iter()
                .map(|kernel| KernelReport {
                    name: kernel.name_str().into_owned(),
                    decode_status: kernel.decode_status,
                    header: kernel.header,
                    checksum_ok: kernel.decode_status == DecodeStatus::Success
                        && kernel.blobs.kernel_info.len() > KERNEL_BINARY_HEADER_SIZE
                        && !has_invalid_checksum(kernel),
                    unhandled_tokens: kernel.unhandled_tokens.len(),
                })
                .collect(),
        });

    let report = serde_json::json!({ "elf": elf, "program": program });
    println!(
        "{}",
        serde_json::to_string_pretty(&report).expect("the report is valid JSON")
    );
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(command) = args.get(1) else {
        usage();
        return ExitCode::FAILURE;
    };

    let result = match command.as_str() {
        "disasm" => run_disasm(&args[2..]),
        "asm" => run_asm(&args[2..]),
        "info" => run_info(&args[2..]),
        "--help" | "-h" => {
            usage();
            return ExitCode::SUCCESS;
        }
        other => {
            usage();
            eprintln!();
            eprintln!("Unknown command {}", other);
            return ExitCode::FAILURE;
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
