use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use segy_core::consts::TRACE_HEADER_SIZE;
use segy_core::{IndexType, NoopMonitor, TraceIndex, TraceKey, TraceStore, VolumeConfig};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

#[derive(Parser)]
#[command(name = "segy", about = "SEG-Y volumes with a persistent sparse trace index")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum CliIndexType {
    Poststack2d,
    Poststack3d,
    Prestack3d,
}

impl From<CliIndexType> for IndexType {
    fn from(t: CliIndexType) -> Self {
        match t {
            CliIndexType::Poststack2d => IndexType::PostStack2d,
            CliIndexType::Poststack3d => IndexType::PostStack3d,
            CliIndexType::Prestack3d => IndexType::PreStack3d,
        }
    }
}

#[derive(Subcommand)]
enum Cmd {
    /// Write a default volume config.
    InitConfig {
        #[arg(long)]
        out: PathBuf,
        #[arg(long = "type", value_enum, default_value_t = CliIndexType::Poststack3d)]
        index_type: CliIndexType,
    },
    /// Build the trace index (reused when fresh unless --force).
    Index {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Print headers, volume metadata and the index summary.
    Info {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the byte offset of the trace at a key.
    Lookup {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        key: String,
    },
    /// Print one trace as JSON.
    Get {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        key: String,
        #[arg(long)]
        z_start: Option<f32>,
        #[arg(long)]
        z_end: Option<f32>,
    },
    /// Print the trace header fields at a key, or its raw bytes in hex.
    Headers {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        key: String,
        #[arg(long, default_value_t = false)]
        raw: bool,
    },
}

fn load_config(path: Option<&Path>) -> Result<VolumeConfig> {
    match path {
        Some(p) => VolumeConfig::load(p).with_context(|| format!("loading config {}", p.display())),
        None => Ok(VolumeConfig::default()),
    }
}

fn open_store(file: &Path, config: Option<&Path>) -> Result<TraceStore> {
    let cfg = load_config(config)?;
    TraceStore::open(file, cfg).with_context(|| format!("opening {}", file.display()))
}

fn parse_key(s: &str) -> Result<TraceKey> {
    Ok(s.parse::<TraceKey>()?)
}

fn fmt_time(t: SystemTime) -> String {
    OffsetDateTime::from(t).format(&Rfc3339).unwrap_or_else(|_| "?".into())
}

fn print_key_stats(store: &TraceStore) {
    for (name, k) in store.config().index_type.key_names().iter().zip(store.key_stats()) {
        println!(
            "  {name:<8} byte={:<4} min={:<8} max={:<8} stride={:<4} size={}",
            k.byte_loc,
            k.min,
            k.max,
            k.effective_stride(),
            k.size()
        );
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    let cli = Cli::parse();
    match cli.cmd {
        Cmd::InitConfig { out, index_type } => {
            let cfg = VolumeConfig::new(index_type.into());
            cfg.save_atomic(&out)?;
            println!("config: {} ({})", out.display(), cfg.index_type);
        }
        Cmd::Index { file, config, force } => {
            let store = open_store(&file, config.as_deref())?;
            if force {
                tracing::info!(path = %file.display(), "forced index rebuild");
                store.rebuild_index(&NoopMonitor)?;
            }
            println!(
                "index: {} type={} traces={}",
                store.index_path().display(),
                store.config().index_type,
                store.num_traces()
            );
            print_key_stats(&store);
            store.close()?;
        }
        Cmd::Info { file, config } => {
            let store = open_store(&file, config.as_deref())?;
            let vol = store.volume();
            println!("text header:");
            for line in vol.text_header.lines() {
                let line = line.trim_end();
                if !line.is_empty() {
                    println!("  {line}");
                }
            }
            println!("binary header:");
            for (name, v) in vol.binary.iter() {
                println!("  {name:<22} {}", serde_json::to_string(&v)?);
            }
            println!("volume:");
            println!("  format      {} (code {})", vol.sample_format.name(), vol.sample_format.code());
            println!("  byte order  {:?}", vol.byte_order);
            println!("  samples     {}", vol.samples_per_trace);
            println!("  z           {} .. {} step {} ({:?})", vol.z_start, vol.z_end(), vol.z_delta, vol.z_domain);
            println!("  units       {:?}", vol.measurement);
            println!("  ext headers {}", vol.num_extended_headers);
            println!("  data offset {}", vol.data_offset);
            println!("  est traces  {}", vol.estimated_traces);
            println!("index:");
            println!("  path        {}", store.index_path().display());
            println!("  type        {}", store.config().index_type);
            println!("  traces      {}", store.num_traces());
            println!("  data mtime  {}", fmt_time(TraceIndex::modified(store.data_path())?));
            println!("  index mtime {}", fmt_time(TraceIndex::modified(store.index_path())?));
            print_key_stats(&store);
        }
        Cmd::Lookup { file, config, key } => {
            let key = parse_key(&key)?;
            let store = open_store(&file, config.as_deref())?;
            match store.lookup(&key)? {
                Some(off) => println!("{key} -> {off}"),
                None => println!("{key} -> missing"),
            }
        }
        Cmd::Get { file, config, key, z_start, z_end } => {
            let key = parse_key(&key)?;
            let store = open_store(&file, config.as_deref())?;
            let vol = store.volume();
            let z0 = z_start.unwrap_or(vol.z_start);
            let z1 = z_end.unwrap_or_else(|| vol.z_end());
            let mut traces = store.get_traces(std::slice::from_ref(&key), z0, z1)?;
            let trace = traces.pop().ok_or_else(|| anyhow!("no trace returned for {key}"))?;
            println!("{}", serde_json::to_string_pretty(&trace)?);
        }
        Cmd::Headers { file, config, key, raw } => {
            let key = parse_key(&key)?;
            let store = open_store(&file, config.as_deref())?;
            let offset = store.lookup(&key)?.ok_or_else(|| anyhow!("no trace at {key}"))?;
            if raw {
                let mut buf = vec![0u8; TRACE_HEADER_SIZE];
                store.accessor().read_buffer(&mut buf, Some(offset))?;
                for (i, chunk) in buf.chunks(16).enumerate() {
                    println!("{:04}: {}", i * 16 + 1, hex::encode(chunk));
                }
            } else {
                let trace = store.get_trace(&key)?;
                for (name, v) in trace.header.iter() {
                    println!("{name:<22} {}", serde_json::to_string(&v)?);
                }
            }
        }
    }
    Ok(())
}
