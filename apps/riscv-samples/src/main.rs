use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use riscv_emulator::{Engine, HaltReason, IsaProfile, LogLevel, Permissions};
use riscv_encoder::{andn, cpop, pack, sext_h, Gpr};
use tracing::info;
use tracing_subscriber::EnvFilter;

const ADDRESS: u64 = 0x10000;
const MAP_SIZE: u64 = 2 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SampleKind {
    Andn,
    Pack,
    Sext,
    Cpop,
}

#[derive(Parser, Debug)]
#[command(
    name = "riscv-samples",
    about = "Execute single bit-manipulation instructions and print the registers they touch."
)]
struct Args {
    /// Samples to run (defaults to all of them)
    #[arg(long = "sample", value_enum)]
    samples: Vec<SampleKind>,

    /// Register width in bits
    #[arg(long, default_value_t = 32, value_parser = clap::value_parser!(u32).range(32..=64))]
    xlen: u32,

    /// Print the instruction log after each sample
    #[arg(long, action = clap::ArgAction::SetTrue)]
    trace: bool,
}

struct Sample {
    title: &'static str,
    word: u32,
    inputs: &'static [(Gpr, u64)],
    output: Gpr,
}

impl SampleKind {
    fn sample(self) -> Sample {
        match self {
            SampleKind::Andn => Sample {
                title: "andn a0, a1, a0",
                word: andn(Gpr::A0, Gpr::A1, Gpr::A0),
                inputs: &[(Gpr::A0, 0xFFFF_BDDD), (Gpr::A1, 0), (Gpr::A2, 0)],
                output: Gpr::A0,
            },
            SampleKind::Pack => Sample {
                title: "pack a2, a0, a1",
                word: pack(Gpr::A2, Gpr::A0, Gpr::A1),
                inputs: &[(Gpr::A0, 0xFFFF_BDDD), (Gpr::A1, 0), (Gpr::A2, 0)],
                output: Gpr::A2,
            },
            SampleKind::Sext => Sample {
                title: "sext.h a0, a0",
                word: sext_h(Gpr::A0, Gpr::A0),
                inputs: &[(Gpr::A0, 0x8000)],
                output: Gpr::A0,
            },
            SampleKind::Cpop => Sample {
                title: "cpop a0, a0",
                word: cpop(Gpr::A0, Gpr::A0),
                inputs: &[(Gpr::A0, 0x7080_7080)],
                output: Gpr::A0,
            },
        }
    }
}

fn run_sample(profile: IsaProfile, sample: &Sample, trace: bool) -> anyhow::Result<()> {
    let level = if trace {
        LogLevel::Verbose
    } else {
        LogLevel::None
    };
    let mut engine = Engine::new(profile)
        .with_context(|| format!("create {} engine", profile))?
        .with_log_level(level);
    engine.map(ADDRESS, MAP_SIZE, Permissions::ALL)?;
    engine.write_bytes(ADDRESS, &sample.word.to_le_bytes())?;
    for &(reg, value) in sample.inputs {
        engine.write_register(reg, value)?;
    }

    println!("##########################");
    for &(reg, _) in sample.inputs {
        println!("{} = 0x{:x}", reg.abi_name().to_uppercase(), engine.get_register(reg));
    }
    println!("##########################");
    println!("{}", sample.title);

    let result = engine.run(ADDRESS, ADDRESS + 4, 0, Duration::ZERO);
    info!(reason = ?result.reason, instructions = result.instructions, "sample finished");
    if trace {
        print!("{}", engine.format_logs());
    }
    if result.reason != HaltReason::Normal {
        match result.error {
            Some(e) => bail!("{} failed: {}", sample.title, e),
            None => bail!("{} halted with {:?}", sample.title, result.reason),
        }
    }

    println!("##########################");
    println!(
        "{} after = 0x{:x}",
        sample.output.abi_name().to_uppercase(),
        engine.get_register(sample.output)
    );
    println!("##########################\n");
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let profile = match args.xlen {
        32 => IsaProfile::rv32(),
        64 => IsaProfile::rv64(),
        other => bail!("unsupported register width {}", other),
    };
    let samples = if args.samples.is_empty() {
        vec![
            SampleKind::Andn,
            SampleKind::Pack,
            SampleKind::Sext,
            SampleKind::Cpop,
        ]
    } else {
        args.samples
    };

    println!("Emulate RISC-V code ({})", profile);
    for kind in samples {
        run_sample(profile, &kind.sample(), args.trace)?;
    }
    Ok(())
}
