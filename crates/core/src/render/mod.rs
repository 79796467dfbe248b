use std::io::Write;

use crate::{
    preview::{ButtonLabel, DisplayAdapter, Notice, PreviewPlot},
    Result,
};

/// Vertical range of the plot, matching a fixed [-1.1, 1.1] amplitude axis.
const Y_LIMIT: f32 = 1.1;

/// Text-mode display backend. Draws the preview as a character grid and
/// prints button changes and notifications as plain lines.
#[derive(Debug)]
pub struct TerminalDisplay<W: Write> {
    out: W,
    width: usize,
    height: usize,
    button: Option<(ButtonLabel, bool)>,
}

impl<W: Write> TerminalDisplay<W> {
    pub fn new(out: W) -> Self {
        Self::with_size(out, 72, 15)
    }

    pub fn with_size(out: W, width: usize, height: usize) -> Self {
        Self {
            out,
            width: width.max(8),
            height: height.max(3),
            button: None,
        }
    }

    pub fn button(&self) -> Option<(ButtonLabel, bool)> {
        self.button
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Rasterises the plot into rows of characters, top row first.
    pub fn rasterize(&self, plot: &PreviewPlot) -> Vec<String> {
        let mut grid = vec![vec![' '; self.width]; self.height];
        let zero_row = self.row_for(0.0);
        for cell in &mut grid[zero_row] {
            *cell = '-';
        }

        if !plot.values.is_empty() && plot.x_upper_bound > 0.0 {
            for (t, value) in plot.timestamps.iter().zip(&plot.values) {
                let column = ((t / plot.x_upper_bound) * self.width as f64) as usize;
                let column = column.min(self.width - 1);
                grid[self.row_for(*value)][column] = '*';
            }
        }

        grid.into_iter().map(|row| row.into_iter().collect()).collect()
    }

    fn row_for(&self, value: f32) -> usize {
        let normalised = ((Y_LIMIT - value.clamp(-Y_LIMIT, Y_LIMIT)) / (2.0 * Y_LIMIT)).clamp(0.0, 1.0);
        ((normalised * (self.height - 1) as f32).round() as usize).min(self.height - 1)
    }
}

impl<W: Write> DisplayAdapter for TerminalDisplay<W> {
    fn draw_waveform(&mut self, plot: &PreviewPlot) -> Result<()> {
        let rows = self.rasterize(plot);
        writeln!(
            self.out,
            "{} @ {:.2} Hz  (0 .. {:.3} ms)",
            plot.family,
            plot.frequency_hz,
            plot.x_upper_bound * 1000.0
        )?;
        for row in rows {
            writeln!(self.out, "|{}", row.trim_end())?;
        }
        self.out.flush()?;
        Ok(())
    }

    fn set_play_button(&mut self, label: ButtonLabel, enabled: bool) {
        if self.button == Some((label, enabled)) {
            return;
        }
        self.button = Some((label, enabled));
        let suffix = if enabled { "" } else { " (disabled)" };
        if let Err(err) = writeln!(self.out, "[ {label} ]{suffix}") {
            tracing::debug!(%err, "failed to write button state");
        }
    }

    fn notify(&mut self, notice: &Notice) {
        if let Err(err) = writeln!(self.out, "{}: {}", notice.title(), notice.message) {
            tracing::debug!(%err, "failed to write notification");
        }
    }
}
