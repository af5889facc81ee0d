use std::env;
use std::fs;
use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context};
use dxbc_glsl::{translate_dxbc, DialectRules, GlslVersion, RuleFlags, TranslateOptions};
use tracing_subscriber::EnvFilter;

fn usage() -> &'static str {
    "\
dxbc-to-glsl: translate a DXBC shader (SM4/SM5) into GLSL

USAGE:
    dxbc-to-glsl <input.dxbc> [--glsl <ver>] [--es] [--has-gs] [--no-ps] [--rules <hex>] [-o <out>]

FLAGS:
    --glsl <ver>     Target version: a #version number (330) or API version (3.3). Default 330
    --es             Target GLSL ES instead of desktop GLSL
    --has-gs         A geometry shader feeds the pixel shader
    --no-ps          No pixel shader consumes this stage's varyings
    --rules <hex>    Override the capability bitmask of the target version
    -o <out>         Write GLSL to <out> instead of stdout

Set RUST_LOG (e.g. RUST_LOG=dxbc_glsl=debug) for diagnostics on stderr.
"
}

fn main() {
    if let Err(err) = real_main() {
        eprintln!("error: {err:#}");
        process::exit(1);
    }
}

fn real_main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut path: Option<PathBuf> = None;
    let mut out: Option<PathBuf> = None;
    let mut version_text = "330".to_owned();
    let mut es = false;
    let mut rules: Option<u64> = None;
    let mut options = TranslateOptions::default();

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print!("{}", usage());
                return Ok(());
            }
            "--glsl" => {
                let Some(v) = args.next() else {
                    bail!("--glsl requires a value");
                };
                version_text = v;
            }
            "--es" => es = true,
            "--has-gs" => options.has_gs = true,
            "--no-ps" => options.has_ps = false,
            "--rules" => {
                let Some(v) = args.next() else {
                    bail!("--rules requires a value");
                };
                let digits = v.trim_start_matches("0x");
                rules = Some(
                    u64::from_str_radix(digits, 16)
                        .with_context(|| format!("invalid --rules value {v:?}"))?,
                );
            }
            "-o" => {
                let Some(v) = args.next() else {
                    bail!("-o requires a value");
                };
                out = Some(PathBuf::from(v));
            }
            _ if arg.starts_with('-') => {
                bail!("unknown option {arg:?}\n\n{}", usage());
            }
            _ => {
                if path.is_some() {
                    bail!("unexpected positional argument {arg:?}\n\n{}", usage());
                }
                path = Some(PathBuf::from(arg));
            }
        }
    }

    let Some(path) = path else {
        bail!("missing DXBC input path\n\n{}", usage());
    };
    // ES 3.0 is the natural ES counterpart of the desktop default.
    if es && version_text == "330" {
        version_text = "300".to_owned();
    }
    let Some(version) = GlslVersion::parse(&version_text, es) else {
        bail!("unknown GLSL{} version {version_text:?}", if es { " ES" } else { "" });
    };
    options.version = version;
    if let Some(bits) = rules {
        options.rules = Some(DialectRules::with_flags(version, RuleFlags::from_bits_truncate(bits)));
    }

    let bytes = fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
    let translation = translate_dxbc(&bytes, &options)
        .with_context(|| format!("failed to translate {}", path.display()))?;

    match out {
        Some(out) => fs::write(&out, translation.glsl())
            .with_context(|| format!("failed to write {}", out.display()))?,
        None => print!("{}", translation.glsl()),
    }
    Ok(())
}
