//! Demo UI engine: a paint canvas driven by the viewers' pointer.
//!
//! Stands in for a real graphics library. Each cycle it polls the
//! pointer, paints where it is pressed, and flushes the dirty area in
//! full-width strips no taller than its partial draw buffer. A forced
//! redraw from the bridge marks the whole canvas dirty.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, info};

use fbcast_core::{
    Area, Bridge, DisplayDriver, FlushOutcome, PixelBuffer, PixelDepth, PointerState,
    RedrawSignal, Rgba, SessionTable,
};

/// Pause between cycles while a viewer is attached.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(20);
/// Pause between availability checks while nobody is watching.
pub const IDLE_INTERVAL: Duration = Duration::from_millis(100);

const BRUSH_RADIUS: u16 = 3;
const BRUSH_COLORS: [Rgba; 4] = [
    Rgba::opaque(0xFF, 0xFF, 0xFF),
    Rgba::opaque(0xFF, 0x40, 0x40),
    Rgba::opaque(0x40, 0xFF, 0x40),
    Rgba::opaque(0x40, 0x80, 0xFF),
];

// ── Canvas ───────────────────────────────────────────────────────

struct Canvas {
    width: u16,
    height: u16,
    pixels: Vec<Rgba>,
}

impl Canvas {
    fn new(width: u16, height: u16) -> Self {
        let (w, h) = (width as usize, height as usize);
        let pixels = (0..h)
            .flat_map(|y| {
                (0..w).map(move |x| Rgba::opaque((x * 255 / w) as u8, (y * 255 / h) as u8, 0x60))
            })
            .collect();
        Self {
            width,
            height,
            pixels,
        }
    }

    fn pixel(&self, x: u16, y: u16) -> Rgba {
        self.pixels[y as usize * self.width as usize + x as usize]
    }

    /// Paint a square brush centred on (x, y). Returns the touched area.
    fn paint(&mut self, x: u16, y: u16, color: Rgba) -> Area {
        let x = x.min(self.width - 1);
        let y = y.min(self.height - 1);
        let area = Area::new(
            x.saturating_sub(BRUSH_RADIUS),
            y.saturating_sub(BRUSH_RADIUS),
            x.saturating_add(BRUSH_RADIUS).min(self.width - 1),
            y.saturating_add(BRUSH_RADIUS).min(self.height - 1),
        );
        for py in area.y1..=area.y2 {
            let row = py as usize * self.width as usize;
            self.pixels[row + area.x1 as usize..=row + area.x2 as usize].fill(color);
        }
        area
    }
}

// ── StripBuffer ──────────────────────────────────────────────────

/// Partial draw buffer in the bridge's pixel depth.
enum StripBuffer {
    Indexed8(Vec<u8>),
    Rgb565(Vec<u16>),
    Rgba8888(Vec<Rgba>),
}

impl StripBuffer {
    fn new(depth: PixelDepth, len: usize) -> Self {
        match depth {
            PixelDepth::Indexed8 => Self::Indexed8(vec![0; len]),
            PixelDepth::Rgb565 => Self::Rgb565(vec![0; len]),
            PixelDepth::Rgba8888 => Self::Rgba8888(vec![Rgba::default(); len]),
        }
    }

    /// Render `area` of the canvas, row-major.
    fn fill(&mut self, canvas: &Canvas, area: Area) -> PixelBuffer<'_> {
        let rows = (area.y1..=area.y2)
            .flat_map(move |y| (area.x1..=area.x2).map(move |x| canvas.pixel(x, y)));

        match self {
            Self::Indexed8(buf) => {
                let n = area.pixel_count().min(buf.len());
                for (dst, px) in buf.iter_mut().zip(rows) {
                    *dst = px.to_rgb332();
                }
                PixelBuffer::Indexed8(&buf[..n])
            }
            Self::Rgb565(buf) => {
                let n = area.pixel_count().min(buf.len());
                for (dst, px) in buf.iter_mut().zip(rows) {
                    *dst = px.to_rgb565();
                }
                PixelBuffer::Rgb565(&buf[..n])
            }
            Self::Rgba8888(buf) => {
                let n = area.pixel_count().min(buf.len());
                for (dst, px) in buf.iter_mut().zip(rows) {
                    *dst = px;
                }
                PixelBuffer::Rgba8888(&buf[..n])
            }
        }
    }
}

/// Split `area` into bands of at most `lines` rows.
pub fn strips(area: Area, lines: u16) -> impl Iterator<Item = Area> {
    let lines = u32::from(lines.max(1));
    let last = u32::from(area.y2);
    let mut y = u32::from(area.y1);
    std::iter::from_fn(move || {
        if y > last {
            return None;
        }
        let end = (y + lines - 1).min(last);
        let band = Area::new(area.x1, y as u16, area.x2, end as u16);
        y = end + 1;
        Some(band)
    })
}

// ── DemoEngine ───────────────────────────────────────────────────

pub struct DemoEngine {
    display: DisplayDriver,
    pointer: Arc<PointerState>,
    redraw: Arc<RedrawSignal>,
    sessions: Arc<SessionTable>,
    canvas: Canvas,
    strip: StripBuffer,
    buffer_lines: u16,
    dirty: Option<Area>,
    ticks: u64,
    running: Arc<AtomicBool>,
}

impl DemoEngine {
    pub fn new(bridge: &Bridge) -> Self {
        let config = bridge.config();
        let width = config.canvas_width;
        let buffer_lines = (config.max_region_pixels / width as usize)
            .clamp(1, config.canvas_height as usize) as u16;

        Self {
            display: bridge.display(),
            pointer: bridge.pointer(),
            redraw: bridge.redraw(),
            sessions: bridge.sessions(),
            canvas: Canvas::new(width, config.canvas_height),
            strip: StripBuffer::new(config.pixel_depth, width as usize * buffer_lines as usize),
            buffer_lines,
            dirty: None,
            ticks: 0,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Handle for stopping [`run`](Self::run) from another task.
    ///
    /// Storing `false` stops the engine even if `run` has not been polled yet.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Run until stopped. Idles while no viewer is attached.
    pub async fn run(mut self) {
        info!(
            width = self.canvas.width,
            height = self.canvas.height,
            buffer_lines = self.buffer_lines,
            "demo engine running"
        );

        while self.running.load(Ordering::SeqCst) {
            if !self.sessions.is_available() {
                tokio::time::sleep(IDLE_INTERVAL).await;
                continue;
            }
            self.tick();
            self.flush_dirty().await;
            tokio::time::sleep(FRAME_INTERVAL).await;
        }

        info!("demo engine stopped");
    }

    /// One input/redraw cycle: honour a forced redraw and paint at the
    /// pointer while it is pressed.
    fn tick(&mut self) {
        self.ticks += 1;
        if self.redraw.take() {
            debug!("full redraw requested");
            self.mark(Area::full(self.canvas.width, self.canvas.height));
        }

        let (reading, _more) = self.pointer.read();
        if reading.pressed {
            let color = BRUSH_COLORS[(self.ticks / 25) as usize % BRUSH_COLORS.len()];
            let area = self.canvas.paint(reading.x, reading.y, color);
            self.mark(area);
        }
    }

    fn mark(&mut self, area: Area) {
        self.dirty = Some(match self.dirty {
            Some(dirty) => dirty.union(&area),
            None => area,
        });
    }

    /// Flush the dirty area strip by strip. Returns how many strips
    /// went out.
    async fn flush_dirty(&mut self) -> usize {
        let Some(dirty) = self.dirty.take() else {
            return 0;
        };

        let mut sent = 0;
        for band in strips(dirty, self.buffer_lines) {
            let pixels = self.strip.fill(&self.canvas, band);
            match self.display.flush(band, pixels).await {
                FlushOutcome::Sent { .. } => sent += 1,
                FlushOutcome::NoViewers => break,
                FlushOutcome::Rejected(_) => {}
            }
        }
        sent
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use fbcast_core::{BridgeConfig, PointerReading};

    fn engine(depth: PixelDepth) -> (Bridge, DemoEngine) {
        let config = BridgeConfig {
            canvas_width: 40,
            canvas_height: 30,
            pixel_depth: depth,
            max_region_pixels: 40 * 8,
            ..BridgeConfig::default()
        };
        let (bridge, _events) = Bridge::new(config).unwrap();
        let engine = DemoEngine::new(&bridge);
        (bridge, engine)
    }

    #[test]
    fn strips_cover_area_in_bands() {
        let bands: Vec<Area> = strips(Area::new(2, 5, 9, 24), 8).collect();
        assert_eq!(
            bands,
            vec![
                Area::new(2, 5, 9, 12),
                Area::new(2, 13, 9, 20),
                Area::new(2, 21, 9, 24),
            ]
        );
    }

    #[test]
    fn strips_reach_bottom_row() {
        let bands: Vec<Area> = strips(Area::new(0, 65530, 0, 65535), 4).collect();
        assert_eq!(bands.len(), 2);
        assert_eq!(bands[1].y2, 65535);
    }

    #[test]
    fn buffer_lines_follow_region_size() {
        let (_bridge, engine) = engine(PixelDepth::Rgb565);
        assert_eq!(engine.buffer_lines, 8);
    }

    #[test]
    fn forced_redraw_marks_whole_canvas() {
        let (bridge, mut engine) = engine(PixelDepth::Rgb565);
        bridge.redraw().request();
        engine.tick();
        assert_eq!(engine.dirty, Some(Area::full(40, 30)));
        assert!(!bridge.redraw().is_pending());
    }

    #[test]
    fn pressed_pointer_paints_around_position() {
        let (bridge, mut engine) = engine(PixelDepth::Rgba8888);
        engine.tick();
        assert_eq!(engine.dirty, None);

        bridge.pointer().set(PointerReading {
            pressed: true,
            x: 1,
            y: 10,
        });
        engine.tick();
        assert_eq!(engine.dirty, Some(Area::new(0, 7, 4, 13)));
        assert_eq!(engine.canvas.pixel(1, 10), BRUSH_COLORS[0]);
    }

    #[test]
    fn strip_buffer_converts_to_depth() {
        let mut canvas = Canvas::new(4, 4);
        let color = Rgba::opaque(0xFF, 0x00, 0x00);
        canvas.paint(0, 0, color);
        let area = Area::new(0, 0, 1, 1);

        let mut strip = StripBuffer::new(PixelDepth::Rgb565, 16);
        assert!(matches!(
            strip.fill(&canvas, area),
            PixelBuffer::Rgb565(px) if px == [0xF800; 4]
        ));

        let mut strip = StripBuffer::new(PixelDepth::Indexed8, 16);
        assert!(matches!(
            strip.fill(&canvas, area),
            PixelBuffer::Indexed8(px) if px == [0xE0; 4]
        ));
    }

    #[tokio::test]
    async fn stop_before_first_poll_ends_run() {
        let (_bridge, engine) = engine(PixelDepth::Rgb565);
        let running = engine.stop_handle();
        let task = tokio::spawn(engine.run());
        running.store(false, Ordering::SeqCst);

        let stopped = tokio::time::timeout(Duration::from_secs(2), task).await;
        assert!(stopped.is_ok());
    }

    #[tokio::test]
    async fn flush_without_viewers_sends_nothing() {
        let (bridge, mut engine) = engine(PixelDepth::Rgb565);
        bridge.redraw().request();
        engine.tick();
        assert_eq!(engine.flush_dirty().await, 0);
        assert_eq!(engine.dirty, None);
    }
}
