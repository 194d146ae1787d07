// Stand-in GB core for the NeoBoy bridge.
//
// Build with:
//   cargo build --release --target wasm32-unknown-unknown \
//     --manifest-path example/neoboy-test-core/Cargo.toml
//
// It exports the full core ABI with the `gb_` prefix. There is no CPU here: each frame draws
// a pattern seeded by the ROM checksum, a cursor the d-pad moves, and a square wave whose
// pitch follows the cursor.

use std::alloc::{Layout, alloc, dealloc};
use std::sync::Mutex;

const WIDTH: usize = 160;
const HEIGHT: usize = 144;
const SAMPLE_RATE: f32 = 44_100.0;
const SAMPLES_PER_FRAME: usize = 735;
const STATE_LEN: usize = 16;

const BUTTON_RIGHT: i32 = 4;
const BUTTON_LEFT: i32 = 5;
const BUTTON_UP: i32 = 6;
const BUTTON_DOWN: i32 = 7;

struct Core {
    framebuffer: Vec<u8>,
    audio: Vec<f32>,
    rom_checksum: u32,
    frames: u32,
    buttons: u16,
    cursor: (u8, u8),
    phase: f32,
}

impl Core {
    fn new() -> Self {
        Self {
            framebuffer: vec![0; WIDTH * HEIGHT * 4],
            audio: vec![0.0; SAMPLES_PER_FRAME],
            rom_checksum: 0,
            frames: 0,
            buttons: 0,
            cursor: (WIDTH as u8 / 2, HEIGHT as u8 / 2),
            phase: 0.0,
        }
    }

    fn pressed(&self, id: i32) -> bool {
        self.buttons & (1 << id) != 0
    }

    fn step(&mut self) {
        self.frames = self.frames.wrapping_add(1);

        let (mut x, mut y) = self.cursor;
        if self.pressed(BUTTON_RIGHT) && (x as usize) < WIDTH - 1 {
            x += 1;
        }
        if self.pressed(BUTTON_LEFT) && x > 0 {
            x -= 1;
        }
        if self.pressed(BUTTON_DOWN) && (y as usize) < HEIGHT - 1 {
            y += 1;
        }
        if self.pressed(BUTTON_UP) && y > 0 {
            y -= 1;
        }
        self.cursor = (x, y);

        self.draw();
        self.synth();
    }

    fn draw(&mut self) {
        let seed = self.rom_checksum;
        let scroll = self.frames as usize;
        for (i, px) in self.framebuffer.chunks_exact_mut(4).enumerate() {
            let (x, y) = (i % WIDTH, i / WIDTH);
            let shade = (((x + scroll) ^ y) as u32).wrapping_add(seed) as u8;
            px.copy_from_slice(&[shade / 4, shade / 2, shade, 0xFF]);
        }

        let (cx, cy) = (self.cursor.0 as usize, self.cursor.1 as usize);
        for y in cy.saturating_sub(2)..(cy + 3).min(HEIGHT) {
            for x in cx.saturating_sub(2)..(cx + 3).min(WIDTH) {
                let offset = (y * WIDTH + x) * 4;
                self.framebuffer[offset..offset + 4].copy_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF]);
            }
        }
    }

    fn synth(&mut self) {
        let freq = 220.0 + self.cursor.0 as f32 * 4.0;
        let step = freq / SAMPLE_RATE;
        for sample in &mut self.audio {
            *sample = if self.phase < 0.5 { 0.2 } else { -0.2 };
            self.phase = (self.phase + step).fract();
        }
    }

    fn encode(&self) -> [u8; STATE_LEN] {
        let mut out = [0u8; STATE_LEN];
        out[0..4].copy_from_slice(&self.frames.to_le_bytes());
        out[4..8].copy_from_slice(&self.rom_checksum.to_le_bytes());
        out[8] = self.cursor.0;
        out[9] = self.cursor.1;
        out[10..12].copy_from_slice(&self.buttons.to_le_bytes());
        out[12..16].copy_from_slice(&self.phase.to_le_bytes());
        out
    }

    fn decode(&mut self, state: &[u8]) -> bool {
        let Ok(state) = <&[u8; STATE_LEN]>::try_from(state) else {
            return false;
        };
        self.frames = u32::from_le_bytes([state[0], state[1], state[2], state[3]]);
        self.rom_checksum = u32::from_le_bytes([state[4], state[5], state[6], state[7]]);
        self.cursor = (state[8], state[9]);
        self.buttons = u16::from_le_bytes([state[10], state[11]]);
        self.phase = f32::from_le_bytes([state[12], state[13], state[14], state[15]]);
        true
    }
}

static CORE: Mutex<Option<Core>> = Mutex::new(None);

fn with_core<R>(default: R, f: impl FnOnce(&mut Core) -> R) -> R {
    match CORE.lock() {
        Ok(mut guard) => guard.as_mut().map_or(default, f),
        Err(_) => default,
    }
}

// Every allocation carries its size in an 8-byte header so `gb_free` can rebuild the layout.
const HEADER: usize = 8;

#[unsafe(no_mangle)]
pub extern "C" fn gb_malloc(len: u32) -> *mut u8 {
    let Ok(layout) = Layout::from_size_align(len as usize + HEADER, HEADER) else {
        return std::ptr::null_mut();
    };
    // SAFETY: the layout has a nonzero size.
    unsafe {
        let base = alloc(layout);
        if base.is_null() {
            return base;
        }
        base.cast::<usize>().write(layout.size());
        base.add(HEADER)
    }
}

/// # Safety
/// `ptr` must come from `gb_malloc` and not have been freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn gb_free(ptr: *mut u8) {
    if ptr.is_null() {
        return;
    }
    // SAFETY: `gb_malloc` wrote the total size just before `ptr`.
    unsafe {
        let base = ptr.sub(HEADER);
        let size = base.cast::<usize>().read();
        dealloc(base, Layout::from_size_align_unchecked(size, HEADER));
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn gb_init() {
    if let Ok(mut guard) = CORE.lock() {
        guard.get_or_insert_with(Core::new);
    }
}

/// # Safety
/// `ptr..ptr + len` must be readable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn gb_load_rom(ptr: *const u8, len: u32) -> i32 {
    if ptr.is_null() || len == 0 {
        return 1;
    }
    // SAFETY: the caller hands us a live buffer of `len` bytes.
    let rom = unsafe { std::slice::from_raw_parts(ptr, len as usize) };
    let checksum = rom.iter().fold(0u32, |acc, &b| acc.rotate_left(5) ^ b as u32);
    with_core(2, |core| {
        core.rom_checksum = checksum;
        core.frames = 0;
        0
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn gb_step_frame() {
    with_core((), Core::step);
}

#[unsafe(no_mangle)]
pub extern "C" fn gb_set_button(id: i32, pressed: i32) {
    if !(0..8).contains(&id) {
        return;
    }
    with_core((), |core| {
        if pressed != 0 {
            core.buttons |= 1 << id;
        } else {
            core.buttons &= !(1 << id);
        }
    });
}

#[unsafe(no_mangle)]
pub extern "C" fn gb_get_framebuffer() -> *const u8 {
    with_core(std::ptr::null(), |core| core.framebuffer.as_ptr())
}

#[unsafe(no_mangle)]
pub extern "C" fn gb_get_audio_buffer() -> *const f32 {
    with_core(std::ptr::null(), |core| core.audio.as_ptr())
}

#[unsafe(no_mangle)]
pub extern "C" fn gb_get_audio_buffer_size() -> u32 {
    with_core(0, |core| core.audio.len() as u32)
}

/// # Safety
/// `ptr` must point at a writable scratch region of at least 16 bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn gb_save_state(ptr: *mut u8) -> u32 {
    with_core(0, |core| {
        let state = core.encode();
        // SAFETY: the host's scratch region is far larger than the state.
        unsafe { std::ptr::copy_nonoverlapping(state.as_ptr(), ptr, state.len()) };
        state.len() as u32
    })
}

/// # Safety
/// `ptr..ptr + len` must be readable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn gb_load_state(ptr: *const u8, len: u32) -> i32 {
    if ptr.is_null() {
        return 1;
    }
    // SAFETY: the caller hands us a live buffer of `len` bytes.
    let state = unsafe { std::slice::from_raw_parts(ptr, len as usize) };
    with_core(2, |core| if core.decode(state) { 0 } else { 1 })
}

#[unsafe(no_mangle)]
pub extern "C" fn gb_reset() {
    with_core((), |core| {
        let checksum = core.rom_checksum;
        *core = Core::new();
        core.rom_checksum = checksum;
    });
}

#[unsafe(no_mangle)]
pub extern "C" fn gb_destroy() {
    if let Ok(mut guard) = CORE.lock() {
        guard.take();
    }
}
