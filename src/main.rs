use classweaver::jvm::{
    ClassReader, ClassWriter, Error, MergePolicy, Printer, ReaderFlags, WriterSettings,
};

use clap::{crate_version, Arg, ArgAction, Command};
use std::fs;

fn main() -> Result<(), Error> {
    env_logger::init();

    let matches = Command::new("classweaver")
        .version(crate_version!())
        .author("Alec Theriault <alec.theriault@gmail.com>")
        .about("Read a JVM class file and write it back out with recomputed frames")
        .arg(
            Arg::new("INPUT")
                .help("Class file to read")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("OUTPUT")
                .help("Where to write the rewritten class (nothing is written otherwise)"),
        )
        .arg(
            Arg::new("dump")
                .long("dump")
                .action(ArgAction::SetTrue)
                .help("Print a listing of the input class"),
        )
        .arg(
            Arg::new("fresh-pool")
                .long("fresh-pool")
                .action(ArgAction::SetTrue)
                .help("Build the output constant pool from scratch (drops unused constants, but attributes copied as is may point at the wrong constants)"),
        )
        .arg(
            Arg::new("maxs-only")
                .long("maxs-only")
                .action(ArgAction::SetTrue)
                .help("Recompute max stack and max locals, but never emit a StackMapTable"),
        )
        .arg(
            Arg::new("lenient-merge")
                .long("lenient-merge")
                .action(ArgAction::SetTrue)
                .help("Merge disagreeing operand stack slots to `top` instead of failing"),
        )
        .arg(
            Arg::new("skip-debug")
                .long("skip-debug")
                .action(ArgAction::SetTrue)
                .help("Drop source file, line number, and local variable information"),
        )
        .get_matches();

    let input = matches
        .get_one::<String>("INPUT")
        .ok_or_else(|| Error::IoError(std::io::ErrorKind::InvalidInput.into()))?;
    log::info!("Reading '{}'", input);
    let bytes = fs::read(input)?;
    let reader = ClassReader::new(&bytes)?;

    let mut flags = ReaderFlags::empty();
    if matches.get_flag("skip-debug") {
        flags |= ReaderFlags::SKIP_DEBUG;
    }

    if matches.get_flag("dump") {
        let mut printer = Printer::new();
        reader.accept(&mut printer, flags)?;
        print!("{}", printer.output());
    }

    let mut settings = if matches.get_flag("maxs-only") {
        WriterSettings::maxs_only()
    } else {
        WriterSettings::new()
    };
    if matches.get_flag("lenient-merge") {
        settings.merge_policy = MergePolicy::Lenient;
    }

    let mut writer = if matches.get_flag("fresh-pool") {
        ClassWriter::new(settings)
    } else {
        ClassWriter::copying_pool(&reader, settings)
    };
    reader.accept(&mut writer, flags)?;
    let output_bytes = writer.to_bytes()?;

    match matches.get_one::<String>("output") {
        Some(output) => {
            log::info!("Writing '{}' ({} bytes)", output, output_bytes.len());
            fs::write(output, &output_bytes)?;
        }
        None => log::info!(
            "Rewrote '{}' into {} bytes (no output requested)",
            reader.class_name(),
            output_bytes.len()
        ),
    }

    Ok(())
}
