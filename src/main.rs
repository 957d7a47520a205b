use cphd_reader::{AccessPolicy, CphdReader, PhaseHistoryRead};
use std::env;

fn main() {
    env_logger::init();
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <path-to-cphd-file> [--buffered]", args[0]);
        std::process::exit(1);
    }

    let cphd_path = &args[1];
    let policy = if args.iter().skip(2).any(|arg| arg == "--buffered") {
        AccessPolicy::Buffered
    } else {
        AccessPolicy::Mapped
    };

    println!("Reading CPHD file: {}", cphd_path);
    println!("{}", "=".repeat(60));

    match CphdReader::open_with(cphd_path, policy) {
        Ok(reader) => {
            let header = reader.header();
            println!("\nFile Information:");
            println!("  Version: {}", header.version_string());
            println!("  Classification: {}", header.classification());
            println!("  Access: {:?}", policy);

            println!("\nBlocks:");
            println!("  XML:     offset {:>12}  size {:>12}", header.xml_block().offset, header.xml_block().size);
            if let Some(support) = header.support_block() {
                println!("  Support: offset {:>12}  size {:>12}", support.offset, support.size);
            }
            println!("  PVP:     offset {:>12}  size {:>12}", header.pvp_block().offset, header.pvp_block().size);
            println!("  Signal:  offset {:>12}  size {:>12}", header.signal_block().offset, header.signal_block().size);

            let metadata = reader.metadata();
            println!("\nChannels ({}, {}):", metadata.channels().len(), metadata.signal_format().as_str());
            for channel in metadata.channels() {
                println!(
                    "  [{}] {} vectors x {} samples",
                    channel.identifier, channel.num_vectors, channel.num_samples
                );
            }

            let layout = metadata.pvp_layout();
            println!("\nPVP fields ({} bytes per record):", layout.record_size);
            for field in &layout.fields {
                println!("  {:<12} offset {:>4}  size {:>3}  {}", field.name, field.offset, field.size, field.format);
            }

            if !metadata.support_arrays().is_empty() {
                println!("\nSupport arrays:");
                for entry in metadata.support_arrays() {
                    println!(
                        "  [{}] {} x {}, {} bytes per element",
                        entry.identifier, entry.num_rows, entry.num_cols, entry.bytes_per_element
                    );
                }
            }
        }
        Err(e) => {
            eprintln!("\nERROR: Failed to read CPHD file");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }
}
