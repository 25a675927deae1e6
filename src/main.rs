use clap::Parser;
use halosharp::codec;
use halosharp::distributed::comm::CommunicationBackend;
use halosharp::distributed::sharpen_or_keep;
use halosharp::error::Result;
use halosharp::filter::Kernel;
use halosharp::image::{Image, RGB_CHANNELS};
use halosharp::output;
use halosharp::stats::Stats;
use std::io;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Distributed high-pass image sharpening
#[derive(Parser)]
#[command(name = "halosharp", version)]
struct Cli {
    /// Image file to sharpen (decoded on the root worker only)
    input: PathBuf,

    /// Side of the high-pass kernel (odd, >= 3)
    #[arg(short, long, default_value_t = 3)]
    kernel_size: usize,

    /// Output file; defaults to a timestamped name under --out-dir
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory for timestamped output files
    #[arg(long, default_value = output::DEFAULT_OUT_DIR)]
    out_dir: PathBuf,

    /// Number of in-process workers (ignored under MPI)
    #[arg(long, default_value_t = 1)]
    workers: usize,

    /// Print the generated kernel to stdout
    #[arg(long)]
    print_kernel: bool,

    /// Print performance stats to stderr
    #[arg(long)]
    stats: bool,
}

fn main() {
    let cli = Cli::parse();

    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(rust_log.as_deref()))
        .with_writer(std::io::stderr)
        .init();

    #[cfg(feature = "distributed")]
    {
        use halosharp::distributed::comm_mpi::MpiComm;

        let comm = MpiComm::initialize().unwrap_or_else(|e| {
            eprintln!("MPI error: {}", e);
            std::process::exit(1);
        });
        if cli.workers > 1 && comm.is_root() {
            tracing::warn!(workers = cli.workers, "--workers is ignored under MPI");
        }
        if let Err(e) = run_rank(&cli, &comm) {
            eprintln!("Error on rank {}: {}", comm.rank(), e);
            comm.abort(1);
        }
    }

    #[cfg(not(feature = "distributed"))]
    {
        use halosharp::distributed::comm::SingleProcessComm;
        use halosharp::distributed::comm_local::run_workers;

        let result = if cli.workers > 1 {
            run_workers(cli.workers, |comm| run_rank(&cli, &comm)).map(|_| ())
        } else {
            run_rank(&cli, &SingleProcessComm)
        };
        if let Err(e) = result {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// One worker's share of the run. Every rank calls this; only the root
/// touches the filesystem.
/// `RUST_LOG` directives if set and valid, otherwise `info` so the
/// kernel-size warning and the root's timing line are visible.
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn run_rank(cli: &Cli, comm: &dyn CommunicationBackend) -> Result<()> {
    let mut stats = if cli.stats { Some(Stats::new()) } else { None };

    let image = if comm.is_root() {
        println!("Number of workers is: {}", comm.num_ranks());
        let t = Instant::now();
        let image = codec::load_image(&cli.input).unwrap_or_else(|e| {
            eprintln!("Could not open the image: {}", e);
            comm.abort(1);
        });
        if let Some(ref mut s) = stats {
            s.add_phase("Decode", t.elapsed());
        }
        println!("Image has {} channels.", image.channels());
        image
    } else {
        Image::empty(RGB_CHANNELS)
    };

    if cli.print_kernel && comm.is_root() {
        if let Ok(kernel) = Kernel::high_pass(cli.kernel_size) {
            output::write_kernel(&kernel, &mut io::stdout())?;
        }
    }

    let sharpened = sharpen_or_keep(&image, cli.kernel_size, comm, stats.as_mut())?;

    if !comm.is_root() {
        return Ok(());
    }

    let path = match &cli.output {
        Some(path) => path.clone(),
        None => output::timestamped_output_path(&cli.input, &cli.out_dir)?,
    };
    let t = Instant::now();
    match codec::save_image(&sharpened, &path) {
        Ok(()) => println!("Image saved successfully: {}", path.display()),
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to save image"),
    }
    if let Some(ref mut s) = stats {
        s.add_phase("Encode", t.elapsed());
    }

    if let Some(ref stats) = stats {
        stats.display();
    }
    Ok(())
}
