#![forbid(unsafe_code)]

// Native-only tool; the stub keeps `--target wasm32-unknown-unknown --workspace` builds working.
#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
fn main() -> anyhow::Result<()> {
    native::main()
}

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use std::path::{Path, PathBuf};
    use std::time::{Duration, Instant};

    use anyhow::{anyhow, bail, Context, Result};
    use clap::{ArgGroup, Parser};
    use hostvm_cpu::{assemble, Instruction};
    use hostvm_host::{CpuState, GpuBackendKind, Host, HostConfig, RunExit, DEFAULT_TRIANGLE};
    use serde::Serialize;
    use tracing::info;
    use tracing_subscriber::EnvFilter;

    const SLICE_INST_BUDGET: u64 = 100_000;

    #[derive(Debug, Parser)]
    #[command(
        name = "hostvm",
        about = "Runs a guest program on the hostvm engines and dumps what it produced",
        group(
            ArgGroup::new("stop")
                .required(true)
                .multiple(true)
                .args(["max_insts", "max_ms"])
        )
    )]
    pub struct Args {
        /// Raw program image, loaded at guest address 0. Defaults to a built-in demo.
        #[arg(long, env = "HOSTVM_PROGRAM")]
        program: Option<PathBuf>,

        /// JSON host configuration; flags below override it.
        #[arg(long, env = "HOSTVM_CONFIG")]
        config: Option<PathBuf>,

        /// Guest memory size in bytes.
        #[arg(long, env = "HOSTVM_MEMORY")]
        memory: Option<u64>,

        /// Stop after executing at most N guest instructions.
        #[arg(long)]
        max_insts: Option<u64>,

        /// Stop after running for at most N milliseconds of host time.
        #[arg(long)]
        max_ms: Option<u64>,

        /// Render the default triangle and write the colour buffer to this PNG file.
        #[arg(long)]
        frame_png: Option<PathBuf>,

        #[arg(long, env = "HOSTVM_WIDTH")]
        width: Option<u32>,

        #[arg(long, env = "HOSTVM_HEIGHT")]
        height: Option<u32>,

        /// `auto`, `wgpu` or `software`.
        #[arg(long, env = "HOSTVM_GPU_BACKEND", value_parser = parse_backend)]
        gpu_backend: Option<GpuBackendKind>,

        /// Run the echo network endpoint until `--max-ms` elapses.
        #[arg(long, requires = "max_ms")]
        serve: bool,

        /// Listening port for `--serve` (0 picks an ephemeral port).
        #[arg(long, env = "HOSTVM_PORT")]
        port: Option<u16>,

        /// Print the final CPU state as JSON on stdout.
        #[arg(long)]
        dump_registers: bool,

        /// Log filter, e.g. `info` or `hostvm_net=trace`. Falls back to `RUST_LOG`.
        #[arg(long, env = "HOSTVM_LOG")]
        log_level: Option<String>,
    }

    fn parse_backend(s: &str) -> Result<GpuBackendKind, String> {
        match s {
            "auto" => Ok(GpuBackendKind::Auto),
            "wgpu" => Ok(GpuBackendKind::Wgpu),
            "software" => Ok(GpuBackendKind::Software),
            other => Err(format!(
                "unknown GPU backend `{other}` (expected auto, wgpu or software)"
            )),
        }
    }

    #[derive(Debug, Serialize)]
    struct Summary {
        retired: u64,
        fault: Option<String>,
        state: CpuState,
    }

    pub fn main() -> Result<()> {
        let args = Args::parse();
        init_tracing(args.log_level.as_deref())?;

        let config = host_config(&args)?;
        let program = match &args.program {
            Some(path) => std::fs::read(path)
                .with_context(|| format!("failed to read program: {}", path.display()))?,
            None => demo_program(),
        };

        let memory_size = config.cpu.memory_size;
        let mut host = Host::new(config);
        if !host.cpu_init(memory_size) {
            bail!("failed to initialise the CPU engine (see log)");
        }
        if !host.cpu_load_program(&program) {
            bail!(
                "program of {} bytes does not fit in guest memory",
                program.len()
            );
        }
        if args.program.is_none() {
            seed_demo_registers(&mut host)?;
        }

        if args.serve {
            let port = host.config().net.port;
            if !host.net_init(port) {
                bail!("failed to start the network engine on port {port} (see log)");
            }
            if let Some(addr) = host.net().local_addr() {
                // Scripts read the bound port from stderr when `--port 0` is used.
                eprintln!("listening on {addr}");
            }
        }

        let start = Instant::now();
        let deadline = args.max_ms.map(|ms| start + Duration::from_millis(ms));
        let mut fault = None;
        let mut total_executed: u64 = 0;

        loop {
            let budget = match args.max_insts {
                Some(max_insts) => {
                    if total_executed >= max_insts {
                        break;
                    }
                    (max_insts - total_executed).min(SLICE_INST_BUDGET)
                }
                None => SLICE_INST_BUDGET,
            };
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                break;
            }

            let exit = host
                .cpu_mut()
                .run_slice(budget)
                .context("CPU run slice failed")?;
            total_executed = total_executed.saturating_add(exit.executed());

            match handle_exit(exit, total_executed) {
                LoopControl::Continue => continue,
                LoopControl::Break(reason) => {
                    fault = Some(reason);
                    break;
                }
            }
        }

        if args.serve {
            serve_until(&host, deadline);
        }

        if let Some(path) = &args.frame_png {
            dump_frame_png(&mut host, path)?;
        }

        if args.dump_registers {
            let state = host
                .cpu_state()
                .ok_or_else(|| anyhow!("CPU state unavailable"))?;
            let summary = Summary {
                retired: host.cpu().retired(),
                fault,
                state,
            };
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        info!(
            executed = total_executed,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "run finished"
        );
        host.shutdown();
        Ok(())
    }

    fn init_tracing(filter: Option<&str>) -> Result<()> {
        let filter = match filter {
            Some(directives) => EnvFilter::try_new(directives)
                .with_context(|| format!("invalid log filter: {directives}"))?,
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        };
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        Ok(())
    }

    fn host_config(args: &Args) -> Result<HostConfig> {
        let mut config = match &args.config {
            Some(path) => HostConfig::load(path)?,
            None => HostConfig::default(),
        };
        if let Some(memory) = args.memory {
            config.cpu.memory_size = memory;
        }
        if let Some(width) = args.width {
            config.gpu.width = width;
        }
        if let Some(height) = args.height {
            config.gpu.height = height;
        }
        if let Some(backend) = args.gpu_backend {
            config.gpu.backend = backend;
        }
        if let Some(port) = args.port {
            config.net.port = port;
        }
        Ok(config)
    }

    /// `r3 = r1 + r2`, `r4 = r3 - r2`, `r5 = r3 + r3`, then zeroed memory (NOPs).
    fn demo_program() -> Vec<u8> {
        assemble(&[
            Instruction::add(3, 1, 2),
            Instruction::sub(4, 3, 2),
            Instruction::add(5, 3, 3),
        ])
    }

    fn seed_demo_registers(host: &mut Host) -> Result<()> {
        let cpu = host.cpu_mut();
        cpu.set_register(1, 40)?;
        cpu.set_register(2, 2)?;
        Ok(())
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum LoopControl {
        Continue,
        Break(String),
    }

    fn handle_exit(exit: RunExit, total_executed: u64) -> LoopControl {
        match exit {
            RunExit::Completed { .. } => LoopControl::Continue,
            RunExit::Faulted { fault, .. } => {
                eprintln!("guest stopped after {total_executed} instructions: {fault}");
                LoopControl::Break(fault.to_string())
            }
        }
    }

    fn serve_until(host: &Host, deadline: Option<Instant>) {
        let Some(deadline) = deadline else {
            return;
        };
        let mut open = 0;
        while Instant::now() < deadline {
            let now_open = host.net_connections().len();
            if now_open != open {
                info!(connections = now_open, "connection table changed");
                open = now_open;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        let stats = host.net().stats();
        info!(
            accepted = stats.accepted,
            bytes_received = stats.bytes_received,
            bytes_sent = stats.bytes_sent,
            "network endpoint served"
        );
    }

    fn dump_frame_png(host: &mut Host, path: &Path) -> Result<()> {
        let (width, height) = (host.config().gpu.width, host.config().gpu.height);
        if !host.gpu_init(width, height) {
            bail!("failed to initialise a {width}x{height} GPU surface (see log)");
        }
        if !host.gpu_render(&DEFAULT_TRIANGLE, 3) {
            bail!("failed to render the default triangle (see log)");
        }
        if let Some(kind) = host.gpu().backend_kind() {
            info!(backend = kind.as_str(), width, height, "frame rendered");
        }

        let rgba = host
            .gpu_color_buffer()
            .ok_or_else(|| anyhow!("no colour buffer after render"))?
            .to_vec();
        let img = image::RgbaImage::from_raw(width, height, rgba)
            .ok_or_else(|| anyhow!("colour buffer does not match {width}x{height}"))?;
        img.save(path)
            .with_context(|| format!("failed to write PNG: {}", path.display()))?;
        Ok(())
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use clap::CommandFactory;

        #[test]
        fn cli_definition_is_consistent() {
            Args::command().debug_assert();
        }

        #[test]
        fn a_stop_condition_is_required() {
            assert!(Args::try_parse_from(["hostvm"]).is_err());
            assert!(Args::try_parse_from(["hostvm", "--max-insts", "10"]).is_ok());
            assert!(Args::try_parse_from(["hostvm", "--max-insts", "10", "--max-ms", "5"]).is_ok());
        }

        #[test]
        fn serve_needs_a_time_budget() {
            assert!(Args::try_parse_from(["hostvm", "--max-insts", "10", "--serve"]).is_err());
            assert!(Args::try_parse_from(["hostvm", "--max-ms", "10", "--serve"]).is_ok());
        }

        #[test]
        fn flags_override_the_config() {
            let args = Args::try_parse_from([
                "hostvm",
                "--max-insts",
                "1",
                "--memory",
                "4096",
                "--width",
                "8",
                "--gpu-backend",
                "software",
                "--port",
                "0",
            ])
            .unwrap();
            let config = host_config(&args).unwrap();
            assert_eq!(config.cpu.memory_size, 4096);
            assert_eq!(config.gpu.width, 8);
            assert_eq!(config.gpu.height, HostConfig::default().gpu.height);
            assert_eq!(config.gpu.backend, GpuBackendKind::Software);
            assert_eq!(config.net.port, 0);
        }

        #[test]
        fn unknown_backend_is_rejected() {
            assert!(parse_backend("vulkan").is_err());
            assert_eq!(parse_backend("auto"), Ok(GpuBackendKind::Auto));
        }
    }
}
