use hostvm_audio::{AudioEngine, AudioSink, AudioStats, NullSink};
use hostvm_cpu::{CpuEngine, CpuState, RunExit};
use hostvm_gpu::{GpuEngine, DEFAULT_TRIANGLE};
use hostvm_net::{ConnectionHandler, ConnectionId, ConnectionInfo, EchoHandler, NetworkEngine};
use hostvm_types::EngineState;
use tracing::{info, warn};

use crate::report::check;
use crate::HostConfig;

/// Owner of the CPU, GPU, audio and network engines.
pub struct Host {
    config: HostConfig,
    cpu: CpuEngine,
    gpu: GpuEngine,
    audio: AudioEngine,
    net: NetworkEngine,
}

impl Default for Host {
    fn default() -> Self {
        Self::new(HostConfig::default())
    }
}

impl Host {
    /// Creates a host with every engine uninitialised.
    pub fn new(config: HostConfig) -> Self {
        Self {
            gpu: GpuEngine::new(config.gpu.backend),
            config,
            cpu: CpuEngine::new(),
            audio: AudioEngine::new(),
            net: NetworkEngine::new(),
        }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn cpu(&self) -> &CpuEngine {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut CpuEngine {
        &mut self.cpu
    }

    pub fn gpu(&self) -> &GpuEngine {
        &self.gpu
    }

    pub fn audio(&self) -> &AudioEngine {
        &self.audio
    }

    pub fn net(&self) -> &NetworkEngine {
        &self.net
    }

    // CPU

    /// Replaces the CPU with a fresh one backed by `memory_size` bytes of guest memory.
    pub fn cpu_init(&mut self, memory_size: u64) -> bool {
        self.config.cpu.memory_size = memory_size;
        let config = self.config.cpu.clone();
        check("cpu", "init", self.cpu.init(&config)).is_some()
    }

    pub fn cpu_load_program(&mut self, program: &[u8]) -> bool {
        check("cpu", "load_program", self.cpu.load_program(program)).is_some()
    }

    pub fn cpu_reset(&mut self) -> bool {
        check("cpu", "reset", self.cpu.reset()).is_some()
    }

    pub fn cpu_start(&mut self) -> bool {
        check("cpu", "start", self.cpu.start()).is_some()
    }

    pub fn cpu_stop(&mut self) -> bool {
        if !self.cpu.lifecycle().is_initialized() {
            warn!(engine = "cpu", op = "stop", "cpu engine is uninitialized");
            return false;
        }
        self.cpu.stop();
        true
    }

    pub fn cpu_run_slice(&mut self, max_instructions: u64) -> Option<RunExit> {
        check("cpu", "run_slice", self.cpu.run_slice(max_instructions))
    }

    pub fn cpu_state(&self) -> Option<CpuState> {
        self.cpu.state()
    }

    pub fn cpu_cleanup(&mut self) {
        self.cpu.cleanup();
    }

    // GPU

    /// Replaces the GPU surface with a `width` x `height` one.
    pub fn gpu_init(&mut self, width: u32, height: u32) -> bool {
        self.gpu.cleanup();
        self.config.gpu.width = width;
        self.config.gpu.height = height;
        self.gpu = GpuEngine::new(self.config.gpu.backend);
        check("gpu", "init", self.gpu.initialize(width, height)).is_some()
    }

    pub fn gpu_render(&mut self, vertices: &[f32], count: usize) -> bool {
        check("gpu", "render", self.gpu.render(vertices, count)).is_some()
    }

    pub fn gpu_color_buffer(&self) -> Option<&[u8]> {
        self.gpu.color_buffer()
    }

    pub fn gpu_cleanup(&mut self) {
        self.gpu.cleanup();
    }

    // Audio

    pub fn audio_init(&mut self) -> bool {
        self.audio_init_with_sink(Box::new(NullSink))
    }

    /// Like [`Host::audio_init`], forwarding every played block to `sink`.
    pub fn audio_init_with_sink(&mut self, sink: Box<dyn AudioSink>) -> bool {
        let config = self.config.audio;
        check(
            "audio",
            "init",
            self.audio.initialize_with_sink(&config, sink),
        )
        .is_some()
    }

    pub fn audio_play(&mut self) -> bool {
        check("audio", "play", self.audio.play()).is_some()
    }

    pub fn audio_stop(&mut self) -> bool {
        check("audio", "stop", self.audio.stop()).is_some()
    }

    pub fn audio_queue(&mut self, samples: &[i16]) -> bool {
        check("audio", "queue_audio", self.audio.queue_audio(samples)).is_some()
    }

    pub fn audio_stats(&self) -> AudioStats {
        self.audio.stats()
    }

    pub fn audio_cleanup(&mut self) {
        self.audio.cleanup();
    }

    // Network

    /// Replaces the network endpoint with an echo listener on `port`.
    pub fn net_init(&mut self, port: u16) -> bool {
        self.net_init_with_handler(port, Box::new(EchoHandler))
    }

    pub fn net_init_with_handler(&mut self, port: u16, handler: Box<dyn ConnectionHandler>) -> bool {
        self.config.net.port = port;
        let config = self.config.net;
        check(
            "net",
            "init",
            self.net.initialize_with_handler(&config, handler),
        )
        .is_some()
    }

    pub fn net_send(&self, conn: ConnectionId, bytes: &[u8]) -> bool {
        check("net", "send", self.net.send(conn, bytes)).is_some()
    }

    pub fn net_connections(&self) -> Vec<ConnectionInfo> {
        self.net.connections()
    }

    pub fn net_cleanup(&mut self) {
        self.net.cleanup();
    }

    // Whole emulator

    /// True once every engine is initialised.
    pub fn is_booted(&self) -> bool {
        self.cpu.lifecycle().is_initialized()
            && self.gpu.lifecycle().is_initialized()
            && self.audio.lifecycle().is_initialized()
            && self.net.lifecycle().is_initialized()
    }

    /// Initialises CPU, GPU, audio and network from the host configuration, in that order.
    ///
    /// The first failure cleans up every engine and returns `false`.
    pub fn boot(&mut self) -> bool {
        let HostConfig { cpu, gpu, net, .. } = self.config.clone();
        let ok = self.cpu_init(cpu.memory_size)
            && self.gpu_init(gpu.width, gpu.height)
            && self.audio_init()
            && self.net_init(net.port);
        if !ok {
            warn!("boot failed; releasing every engine");
            self.cleanup_all();
            return false;
        }
        info!(
            memory_size = cpu.memory_size,
            width = gpu.width,
            height = gpu.height,
            port = ?self.net.local_addr().map(|a| a.port()),
            "host booted"
        );
        true
    }

    /// Starts the CPU, renders the default triangle and starts audio playback.
    pub fn start(&mut self) -> bool {
        let ok = self.cpu_start()
            && self.gpu_render(&DEFAULT_TRIANGLE, 3)
            && self.audio_play();
        if ok {
            info!("host started");
        }
        ok
    }

    /// Stops audio playback, then the CPU.
    pub fn stop(&mut self) {
        let audio_running = self.audio.lifecycle().is_running();
        let cpu_running = self.cpu.lifecycle().is_running();
        if audio_running {
            self.audio_stop();
        }
        if self.cpu.lifecycle().is_initialized() {
            self.cpu.stop();
        }
        if audio_running || cpu_running {
            info!("host stopped");
        }
    }

    /// Stops everything and releases every engine in reverse initialisation order.
    pub fn shutdown(&mut self) {
        let any_initialized = self
            .lifecycles()
            .iter()
            .any(|(_, state)| state.is_initialized());
        self.stop();
        self.cleanup_all();
        if any_initialized {
            info!("host shut down");
        }
    }

    fn cleanup_all(&mut self) {
        self.net.cleanup();
        self.audio.cleanup();
        self.gpu.cleanup();
        self.cpu.cleanup();
    }

    /// Lifecycle of each engine, in boot order.
    pub fn lifecycles(&self) -> [(&'static str, EngineState); 4] {
        [
            ("cpu", self.cpu.lifecycle()),
            ("gpu", self.gpu.lifecycle()),
            ("audio", self.audio.lifecycle()),
            ("net", self.net.lifecycle()),
        ]
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        self.shutdown();
    }
}
