//! CLI tool for converting NeoReader highlights into PDF annotations

use boox_highlights::backup::{clean_up, remove_annotation_dir, restore, restore_from_bak};
use boox_highlights::{convert_file, ConvertOptions, PdfError};
use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;

#[derive(Debug, Default)]
struct Args {
    target: Option<PathBuf>,
    clean: bool,
    clean_entire_dir: bool,
    restore: bool,
    new_file: bool,
    no_backup: bool,
    verbose: bool,
    author: Option<String>,
}

fn usage(program: &str) {
    eprintln!("Usage: {} [options] [FILE_OR_DIR]", program);
    eprintln!();
    eprintln!("Convert Boox NeoReader highlight annotations to standard PDF format.");
    eprintln!("A directory argument applies the action to every PDF inside it.");
    eprintln!("(default: current working directory)");
    eprintln!();
    eprintln!("  -c, --clean          Remove the .bak files");
    eprintln!("      --clean-entire-dir");
    eprintln!("                       Also remove annotation export directories (implies --clean)");
    eprintln!("  -r, --restore        Restore the original PDFs from their .bak files");
    eprintln!("  -n, --new-file       Write result.<name> instead of overwriting the input");
    eprintln!("      --no-backup      Do not create a .bak file (dangerous without --new-file)");
    eprintln!("      --author NAME    Author recorded on the created highlights");
    eprintln!("  -v, --verbose        Log conversion progress");
}

fn parse_args(program: &str, raw: &[String]) -> Args {
    let mut args = Args::default();
    let mut iter = raw.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-c" | "--clean" => args.clean = true,
            "--clean-entire-dir" => {
                args.clean_entire_dir = true;
                args.clean = true;
            }
            "-r" | "--restore" => args.restore = true,
            "-n" | "--new-file" => args.new_file = true,
            "--no-backup" => args.no_backup = true,
            "-v" | "--verbose" => args.verbose = true,
            "--author" => match iter.next() {
                Some(name) => args.author = Some(name.clone()),
                None => {
                    eprintln!("--author needs a value");
                    process::exit(1);
                }
            },
            "-h" | "--help" => {
                usage(program);
                process::exit(0);
            }
            other if other.starts_with('-') => {
                eprintln!("Unknown option: {}", other);
                usage(program);
                process::exit(1);
            }
            other => {
                if args.target.is_some() {
                    eprintln!("Only one FILE_OR_DIR may be given");
                    process::exit(1);
                }
                args.target = Some(PathBuf::from(other));
            }
        }
    }
    args
}

fn init_logger(verbose: bool) {
    let level = if verbose { "debug" } else { "error" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| writeln!(buf, "{}: {}", record.level(), record.args()))
        .init();
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension().map_or(false, |e| e == ext)
}

fn convert_one(path: &Path, options: &ConvertOptions) -> Result<(), PdfError> {
    let Some(report) = convert_file(path, options)? else {
        return Ok(());
    };
    for page in &report.pages {
        println!(
            ">> Page {} successfully converted: {}",
            page.page + 1,
            page.added
        );
    }
    if report.duplicates > 0 {
        println!(">> Already present, skipped: {}", report.duplicates);
    }
    for failure in &report.failures {
        println!(
            ">> Page {} not converted ({}): {:?}",
            failure.page + 1,
            failure.reason,
            failure.text
        );
    }
    if let Some(output) = &report.output {
        println!(">> Written to {}", output.display());
    }
    Ok(())
}

fn run(args: &Args, target: &Path) -> Result<(), PdfError> {
    let options = ConvertOptions {
        author: args.author.clone(),
        new_file: args.new_file,
        backup: !args.no_backup,
        ..ConvertOptions::default()
    };

    if !target.is_dir() {
        if args.clean {
            clean_up(target)?;
        } else if args.restore {
            restore(target)?;
        } else {
            convert_one(target, &options)?;
        }
        return Ok(());
    }

    let mut entries: Vec<PathBuf> = std::fs::read_dir(target)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    for file in entries {
        if has_extension(&file, "bak") && args.restore {
            restore_from_bak(&file)?;
        } else if has_extension(&file, "pdf") {
            if args.clean_entire_dir {
                remove_annotation_dir(&file)?;
            }
            if args.clean {
                clean_up(&file)?;
            } else if !args.restore {
                println!("{}", "=".repeat(80));
                println!(" {}", file.file_name().unwrap_or_default().to_string_lossy());
                println!("{}", "-".repeat(80));
                if let Err(e) = convert_one(&file, &options) {
                    eprintln!("Error: {}", e);
                }
                println!();
            }
        }
    }
    Ok(())
}

fn main() {
    let raw: Vec<String> = env::args().collect();
    let program = raw.first().map(String::as_str).unwrap_or("boox2pdf");
    let args = parse_args(program, &raw[1.min(raw.len())..]);
    init_logger(args.verbose);

    if args.clean && args.restore {
        eprintln!("The flags -c and -r are mutually exclusive, cannot be both set!");
        process::exit(1);
    }

    let target = match &args.target {
        Some(path) => path.clone(),
        None => match env::current_dir() {
            Ok(dir) => dir,
            Err(e) => {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        },
    };

    if let Err(e) = run(&args, &target) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
