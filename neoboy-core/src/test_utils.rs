//! Shared test fixtures: a WAT emulator core, a scripted audio device and a recording display.

use crate::abi::{CoreKind, Export};
use crate::av::audio::AudioOutput;
use crate::av::framebuffer::{DisplaySurface, OwnedImage, PixelImage};
use crate::config::BridgeConfig;
use crate::module::ModuleHandle;
use crate::runtime::BridgeEngine;

/// Offset of the last pixel of a 160x144 frame.
pub const GB_LAST_PIXEL: usize = (160 * 144 - 1) * 4;

/// How the fixture decorates its export names.
#[derive(Copy, Clone, Debug)]
pub enum Naming {
    /// `load_rom`
    Bare,
    /// `_load_rom`
    Emscripten,
    /// `gb_load_rom`
    Prefixed(CoreKind),
    /// `_gb_load_rom`
    EmscriptenPrefixed(CoreKind),
}

impl Naming {
    fn symbol(self, export: Export) -> String {
        let bare = export.name();
        match self {
            Naming::Bare => bare.to_string(),
            Naming::Emscripten => format!("_{bare}"),
            Naming::Prefixed(core) => format!("{}{bare}", core.prefix()),
            Naming::EmscriptenPrefixed(core) => format!("_{}{bare}", core.prefix()),
        }
    }
}

/// A minimal core written in WAT.
///
/// Memory starts at one page and the bump allocator hands out addresses from 64 KiB upwards,
/// so the first allocation always grows linear memory. `init` allocates the framebuffer and a
/// four-sample audio buffer, so both live in grown pages.
///
/// `step_frame` writes pixel 0 as `(frames, 0x22, 0x33, 0xFF)`, the last GB pixel as
/// `(0x10, 0x20, 0x40, 0x80)` and the samples `[0.5, -0.5, 0.25, frames]`.
/// `load_rom` returns status 2 if `init` has not run, 1 for an empty ROM, 0 otherwise.
/// `save_state` writes 8 bytes: frame counter and ROM byte sum.
pub struct FixtureCore {
    naming: Naming,
    omitted: Vec<Export>,
    save_state_size: Option<u32>,
}

impl FixtureCore {
    pub fn new(naming: Naming) -> Self {
        Self {
            naming,
            omitted: Vec::new(),
            save_state_size: None,
        }
    }

    /// Hide `export` under a name the resolver never probes.
    pub fn without(mut self, export: Export) -> Self {
        self.omitted.push(export);
        self
    }

    /// Make `save_state` report `size` bytes instead of 8.
    pub fn reporting_save_size(mut self, size: u32) -> Self {
        self.save_state_size = Some(size);
        self
    }

    pub fn wat(&self) -> String {
        let mut wat = FIXTURE_WAT.replace(
            "@save_size@",
            &self.save_state_size.unwrap_or(8).to_string(),
        );
        for export in Export::ALL {
            let symbol = if self.omitted.contains(&export) {
                format!("hidden_{}", export.name())
            } else {
                self.naming.symbol(export)
            };
            wat = wat.replace(&format!("@{}@", export.name()), &symbol);
        }
        wat
    }

    pub fn instantiate(&self, core: CoreKind) -> ModuleHandle {
        instantiate_wat(&self.wat(), core, &BridgeConfig::default())
    }
}

pub fn instantiate_wat(wat: &str, core: CoreKind, config: &BridgeConfig) -> ModuleHandle {
    let engine = BridgeEngine::new(config).expect("engine");
    engine.load(wat.as_bytes(), core).expect("fixture core instantiates")
}

const FIXTURE_WAT: &str = r#"
(module
  (memory $mem 1)
  (export "memory" (memory $mem))

  (global $heap (mut i32) (i32.const 65536))
  (global $fb (mut i32) (i32.const 0))
  (global $audio (mut i32) (i32.const 0))
  (global $initialized (mut i32) (i32.const 0))
  (global $destroyed (mut i32) (i32.const 0))
  (global $frames (mut i32) (i32.const 0))
  (global $buttons (mut i32) (i32.const 0))
  (global $frees (mut i32) (i32.const 0))
  (global $rom_sum (mut i32) (i32.const 0))
  (global $rom_len (mut i32) (i32.const 0))

  (func $malloc (param $len i32) (result i32)
    (local $ptr i32)
    (local $end i32)
    (local.set $ptr (global.get $heap))
    (local.set $end (i32.add (local.get $ptr) (local.get $len)))
    (if (i32.lt_u (local.get $end) (local.get $ptr))
      (then (return (i32.const 0))))
    (block $fits
      (loop $grow
        (br_if $fits
          (i32.le_u (local.get $end) (i32.mul (memory.size) (i32.const 65536))))
        (if (i32.eq (memory.grow (i32.const 1)) (i32.const -1))
          (then (return (i32.const 0))))
        (br $grow)))
    (global.set $heap
      (i32.and (i32.add (local.get $end) (i32.const 7)) (i32.const -8)))
    (local.get $ptr))

  (func $free (param $ptr i32)
    (global.set $frees (i32.add (global.get $frees) (i32.const 1))))

  (func $init
    (global.set $fb (call $malloc (i32.const 153600)))
    (global.set $audio (call $malloc (i32.const 16)))
    (global.set $initialized (i32.const 1)))

  (func $load_rom (param $ptr i32) (param $len i32) (result i32)
    (local $i i32)
    (local $sum i32)
    (if (i32.eqz (global.get $initialized))
      (then (return (i32.const 2))))
    (if (i32.eqz (local.get $len))
      (then (return (i32.const 1))))
    (block $done
      (loop $sum_bytes
        (br_if $done (i32.ge_u (local.get $i) (local.get $len)))
        (local.set $sum
          (i32.add (local.get $sum)
            (i32.load8_u (i32.add (local.get $ptr) (local.get $i)))))
        (local.set $i (i32.add (local.get $i) (i32.const 1)))
        (br $sum_bytes)))
    (global.set $rom_sum (local.get $sum))
    (global.set $rom_len (local.get $len))
    (i32.const 0))

  (func $step_frame
    (if (i32.eqz (global.get $initialized))
      (then (return)))
    (global.set $frames (i32.add (global.get $frames) (i32.const 1)))
    (i32.store (global.get $fb)
      (i32.or (i32.const 0xFF332200) (i32.and (global.get $frames) (i32.const 0xFF))))
    (i32.store (i32.add (global.get $fb) (i32.const 92156)) (i32.const 0x80402010))
    (f32.store (global.get $audio) (f32.const 0.5))
    (f32.store offset=4 (global.get $audio) (f32.const -0.5))
    (f32.store offset=8 (global.get $audio) (f32.const 0.25))
    (f32.store offset=12 (global.get $audio) (f32.convert_i32_u (global.get $frames))))

  (func $set_button (param $id i32) (param $pressed i32)
    (if (local.get $pressed)
      (then
        (global.set $buttons
          (i32.or (global.get $buttons) (i32.shl (i32.const 1) (local.get $id)))))
      (else
        (global.set $buttons
          (i32.and (global.get $buttons)
            (i32.xor (i32.shl (i32.const 1) (local.get $id)) (i32.const -1)))))))

  (func $get_framebuffer (result i32) (global.get $fb))
  (func $get_audio_buffer (result i32) (global.get $audio))
  (func $get_audio_buffer_size (result i32)
    (if (result i32) (global.get $initialized)
      (then (i32.const 4))
      (else (i32.const 0))))

  (func $save_state (param $ptr i32) (result i32)
    (i32.store (local.get $ptr) (global.get $frames))
    (i32.store offset=4 (local.get $ptr) (global.get $rom_sum))
    (i32.const @save_size@))

  (func $load_state (param $ptr i32) (param $len i32) (result i32)
    (if (i32.ne (local.get $len) (i32.const 8))
      (then (return (i32.const -1))))
    (global.set $frames (i32.load (local.get $ptr)))
    (global.set $rom_sum (i32.load offset=4 (local.get $ptr)))
    (i32.const 0))

  (func $reset (global.set $frames (i32.const 0)))

  (func $destroy
    (global.set $initialized (i32.const 0))
    (global.set $destroyed (i32.add (global.get $destroyed) (i32.const 1))))

  (export "@malloc@" (func $malloc))
  (export "@free@" (func $free))
  (export "@init@" (func $init))
  (export "@load_rom@" (func $load_rom))
  (export "@step_frame@" (func $step_frame))
  (export "@set_button@" (func $set_button))
  (export "@get_framebuffer@" (func $get_framebuffer))
  (export "@get_audio_buffer@" (func $get_audio_buffer))
  (export "@get_audio_buffer_size@" (func $get_audio_buffer_size))
  (export "@save_state@" (func $save_state))
  (export "@load_state@" (func $load_state))
  (export "@reset@" (func $reset))
  (export "@destroy@" (func $destroy))

  (func (export "probe_frames") (result i32) (global.get $frames))
  (func (export "probe_buttons") (result i32) (global.get $buttons))
  (func (export "probe_frees") (result i32) (global.get $frees))
  (func (export "probe_rom_sum") (result i32) (global.get $rom_sum))
  (func (export "probe_rom_len") (result i32) (global.get $rom_len))
  (func (export "probe_initialized") (result i32) (global.get $initialized))
  (func (export "probe_destroyed") (result i32) (global.get $destroyed))
)
"#;

/// Audio device with a hand-driven clock that records every scheduled chunk.
#[derive(Debug)]
pub struct FakeOutput {
    pub now: f64,
    pub sample_rate: u32,
    pub scheduled: Vec<(f64, Vec<f32>)>,
    pub suspended: bool,
    pub closed: bool,
}

impl FakeOutput {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            now: 0.0,
            sample_rate,
            scheduled: Vec::new(),
            suspended: false,
            closed: false,
        }
    }

    pub fn starts(&self) -> Vec<f64> {
        self.scheduled.iter().map(|(start, _)| *start).collect()
    }
}

impl AudioOutput for FakeOutput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn current_time(&self) -> f64 {
        self.now
    }

    fn schedule(&mut self, samples: &[f32], start_time: f64) {
        self.scheduled.push((start_time, samples.to_vec()));
    }

    fn suspend(&mut self) {
        self.suspended = true;
    }

    fn resume(&mut self) {
        self.suspended = false;
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// Display surface that keeps a copy of every presented frame.
#[derive(Default)]
pub struct RecordingDisplay {
    pub detached: bool,
    pub frames: Vec<OwnedImage>,
}

impl DisplaySurface for RecordingDisplay {
    fn attached(&self) -> bool {
        !self.detached
    }

    fn present(&mut self, frame: &PixelImage<'_>) {
        self.frames.push(frame.to_owned_image());
    }
}

pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}
