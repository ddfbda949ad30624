#[macro_use]
extern crate clap;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::{App, Arg};
use simasm::AssemblerError;
use simcpu::Isa;

#[derive(Debug)]
enum Error {
    Assembler(AssemblerError),
    Io(std::io::Error, PathBuf),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Assembler(err) => write!(f, "{}", err),
            Error::Io(err, path) => {
                write!(f, "Writing output file \"{}\" failed: {}", path.display(), err)
            }
        }
    }
}

fn main() {
    pretty_env_logger::init();

    // Parse command line arguments
    let matches = App::new("simasm")
        .version(crate_version!())
        .about("Assembles programs for the simcpu ISA family")
        .arg(
            Arg::with_name("file")
                .short("f")
                .long("file")
                .takes_value(true)
                .value_name("PATH")
                .required(true)
                .help("Assembly program file path"),
        )
        .arg(
            Arg::with_name("isa")
                .long("isa")
                .takes_value(true)
                .value_name("ISA")
                .required(true)
                .help("ISA architecture: RISC1 (stack), RISC2 (accumulator), RISC3 (register), CISC"),
        )
        .arg(
            Arg::with_name("output")
                .short("o")
                .long("output")
                .takes_value(true)
                .value_name("PATH")
                .help("Output file for the binary listing"),
        )
        .get_matches();

    let file = matches.value_of("file").unwrap();
    let isa = matches.value_of("isa").unwrap();
    let output = matches.value_of("output");

    if let Err(err) = simasm_main(file, isa, output) {
        eprintln!("{}", err);
        std::process::exit(1);
    }
}

fn simasm_main(file: &str, isa: &str, output: Option<&str>) -> Result<(), Error> {
    let isa = Isa::from_str(isa)
        .map_err(|_| Error::Assembler(AssemblerError::UnknownIsa(isa.to_owned())))?;

    let input_path = Path::new(file);
    let source = fs::read_to_string(input_path)
        .map_err(|_| Error::Assembler(AssemblerError::MissingFile(file.to_owned())))?;

    let listing = simasm::assemble(isa, &source).map_err(Error::Assembler)?;

    // Default to the source basename with a .bin extension, same directory.
    let output_path = output
        .map(PathBuf::from)
        .unwrap_or_else(|| input_path.with_extension("bin"));
    fs::write(&output_path, listing).map_err(|err| Error::Io(err, output_path.clone()))?;
    Ok(())
}
