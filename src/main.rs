use std::fs;
use std::path::{Path, PathBuf};

use structopt::StructOpt;

use shascr::assembler::{Assembler, Bytecode};
use shascr::error::SourceMetadata;
use shascr::vm::{Vm, VmConfig};

use tracing_subscriber::fmt;

const ASSEMBLY_EXTENSION: &str = "shascr";
const BYTECODE_EXTENSION: &str = "shascrbyte";

fn main() {
    if let Err(ref e) = run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), anyhow::Error> {
    let opt = Opt::from_args();

    if let Ok(filter) = std::env::var("SHASCR_TRACE") {
        fmt::Subscriber::builder()
            .with_ansi(true)
            .with_env_filter(filter)
            .init();
    }

    match opt {
        Opt::Compile { file, output } => {
            let assembly = compile_file(&file)?;
            let out_file = output.unwrap_or_else(|| file.with_extension(ASSEMBLY_EXTENSION));
            log::debug!("writing assembly to {}", out_file.display());
            fs::write(out_file, assembly)?;
        }
        Opt::Assemble { file, output } => {
            let code = assemble_file(&file)?;
            let out_file = output.unwrap_or_else(|| file.with_extension(BYTECODE_EXTENSION));
            log::debug!("writing {} words to {}", code.len(), out_file.display());
            fs::write(out_file, code.to_lines())?;
            println!("{}", code);
        }
        Opt::Run { file, machine } => {
            let code = Bytecode::parse(&fs::read_to_string(&file)?)?;
            execute(code, machine.config())?;
        }
        Opt::Execute { file, machine } => {
            let assembly = compile_file(&file)?;
            let meta = SourceMetadata::new(&assembly).with_file(file.with_extension(ASSEMBLY_EXTENSION));
            let code = Assembler::new(&meta).assemble()?;
            execute(code, machine.config())?;
        }
    }
    Ok(())
}

fn compile_file(file: &Path) -> Result<String, anyhow::Error> {
    let source = fs::read_to_string(file)?;
    let meta = SourceMetadata::new(&source).with_file(file.to_path_buf());
    Ok(shascr::compile(&meta)?)
}

fn assemble_file(file: &Path) -> Result<Bytecode, anyhow::Error> {
    let text = fs::read_to_string(file)?;
    let meta = SourceMetadata::new(&text).with_file(file.to_path_buf());
    Ok(Assembler::new(&meta).assemble()?)
}

fn execute(code: Bytecode, config: VmConfig) -> Result<(), anyhow::Error> {
    log::debug!("running {} words with {:?}", code.len(), config);
    let end = Vm::new(code, config).run()?;
    match end.top_of_stack() {
        Some(value) => println!("{}", value),
        None => println!("(empty stack)"),
    }
    log::debug!("{} steps, sp = {}", end.steps, end.stack_pointer());
    Ok(())
}

#[derive(Debug, StructOpt)]
struct MachineOpt {
    /// Memory size of the machine, in words
    #[structopt(long = "memory", default_value = "65536")]
    memory: usize,
    /// Maximum number of instructions to execute, 0 for no limit
    #[structopt(long = "steps", default_value = "10000000")]
    steps: u64,
}

impl MachineOpt {
    fn config(&self) -> VmConfig {
        VmConfig {
            memory_words: self.memory,
            step_budget: (self.steps > 0).then(|| self.steps),
        }
    }
}

#[derive(Debug, StructOpt)]
#[structopt(name = "shascr", about = "Compiles and runs shascr scripts")]
enum Opt {
    /// Compile a script to assembly
    Compile {
        /// The file to compile
        #[structopt(parse(from_os_str))]
        file: PathBuf,
        /// The (optional) output file
        #[structopt(short = "o", long = "output", parse(from_os_str))]
        output: Option<PathBuf>,
    },
    /// Assemble assembly text to bytecode
    Assemble {
        /// The assembly file
        #[structopt(parse(from_os_str))]
        file: PathBuf,
        /// The (optional) output file
        #[structopt(short = "o", long = "output", parse(from_os_str))]
        output: Option<PathBuf>,
    },
    /// Run a bytecode file
    Run {
        /// The bytecode file
        #[structopt(parse(from_os_str))]
        file: PathBuf,
        #[structopt(flatten)]
        machine: MachineOpt,
    },
    /// Compile, assemble and run a script
    Execute {
        /// The file to run
        #[structopt(parse(from_os_str))]
        file: PathBuf,
        #[structopt(flatten)]
        machine: MachineOpt,
    },
}
