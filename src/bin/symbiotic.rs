// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Thin CLI entry point. Argument parsing, help text, and option-file
//! loading are deliberately kept outside the library: this binary only
//! translates `clap`-parsed flags into an `Options`/`Session` pair and
//! reports the resulting verdict as a process exit code.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;

use symbiotic::options::{Property, SlicerPta};
use symbiotic::{KleeBackend, Options, Session};

#[derive(Parser, Debug)]
#[command(name = "symbiotic", about = "Compile, instrument, slice, and verify C sources")]
struct Cli {
    /// Source files to verify, or a single precompiled `.bc` file with --bc.
    sources: Vec<PathBuf>,

    /// Treat `sources[0]` as an already-compiled bitcode file.
    #[arg(long)]
    bc: bool,

    /// Check memory safety (out-of-bounds access, use-after-free, leaks).
    #[arg(long)]
    memsafety: bool,

    /// Check for signed integer overflow.
    #[arg(long = "overflow")]
    signedoverflow: bool,

    /// Check for undefined behavior beyond overflow/memory safety.
    #[arg(long)]
    undefinedness: bool,

    /// SV-COMP property file selecting the properties above.
    #[arg(long)]
    prp: Option<PathBuf>,

    #[arg(long = "cflag", action = clap::ArgAction::Append)]
    cflags: Vec<String>,

    #[arg(long = "cppflag", action = clap::ArgAction::Append)]
    cppflags: Vec<String>,

    #[arg(long = "32")]
    is32bit: bool,

    #[arg(long)]
    add_libc: bool,

    #[arg(long = "link-file", action = clap::ArgAction::Append)]
    link_files: Vec<String>,

    #[arg(long = "linkundef", action = clap::ArgAction::Append)]
    linkundef: Vec<String>,

    #[arg(long)]
    undefined_are_pure: bool,

    #[arg(long, value_enum)]
    slicer_pta: Option<SlicerPtaArg>,

    #[arg(long = "slicer-param", action = clap::ArgAction::Append)]
    slicer_params: Vec<String>,

    #[arg(long, default_value_t = 1)]
    repeat_slicing: u32,

    #[arg(long = "optlevel", action = clap::ArgAction::Append)]
    optlevel: Vec<String>,

    #[arg(long)]
    no_optimize: bool,

    #[arg(long)]
    noslice: bool,

    #[arg(long)]
    stats: bool,

    #[arg(long)]
    no_verification: bool,

    #[arg(long = "tool-param", action = clap::ArgAction::Append)]
    tool_params: Vec<String>,

    #[arg(long = "output")]
    final_output: Option<PathBuf>,

    #[arg(long, env = "SYMBIOTIC_DIR", default_value = "/opt/symbiotic")]
    symbiotic_dir: PathBuf,

    #[arg(long, env = "CLANG_VERIFIER", default_value = "klee")]
    verifier: PathBuf,

    #[arg(short, long)]
    debug: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum SlicerPtaArg {
    Fi,
    Fs,
}

impl From<SlicerPtaArg> for SlicerPta {
    fn from(v: SlicerPtaArg) -> Self {
        match v {
            SlicerPtaArg::Fi => SlicerPta::FlowInsensitive,
            SlicerPtaArg::Fs => SlicerPta::FlowSensitive,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.debug {
        symbiotic::logger::enable_debug();
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .without_time()
        .init();

    symbiotic::process::install_sigint_handler().context("installing SIGINT handler")?;

    if cli.sources.is_empty() {
        bail!("no source files given");
    }

    let mut options = Options::new(&cli.symbiotic_dir);
    options.cflags = cli.cflags;
    options.cppflags = cli.cppflags;
    options.is32bit = cli.is32bit;
    options.add_libc = cli.add_libc;
    options.link_files = cli.link_files;
    options.linkundef = cli.linkundef;
    options.undefined_are_pure = cli.undefined_are_pure;
    options.slicer_pta = cli.slicer_pta.map(SlicerPta::from);
    options.slicer_params = cli.slicer_params;
    options.repeat_slicing = cli.repeat_slicing;
    options.optlevel = cli.optlevel;
    options.no_optimize = cli.no_optimize;
    options.noslice = cli.noslice;
    options.source_is_bc = cli.bc;
    options.stats = cli.stats;
    options.no_verification = cli.no_verification;
    options.tool_params = cli.tool_params;
    options.final_output = cli.final_output;
    options.property = Property::new(cli.memsafety, cli.signedoverflow, cli.undefinedness, cli.prp);

    let backend = Box::new(KleeBackend::new(cli.verifier, "3.9.1"));
    let mut session = Session::new(cli.sources, backend, options, cli.symbiotic_dir);

    let verdict = session
        .run()
        .context("pipeline run failed")?;

    std::process::exit(if verdict == "true" { 0 } else { 1 });
}
