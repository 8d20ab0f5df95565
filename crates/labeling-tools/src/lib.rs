//! The Plot-Tool Harness: a bounded, per-agent viewer over an in-memory
//! signal, with clamped navigation, zoom, and crossing-interpolation
//! operations an agent can invoke as tool calls.
//!
//! Tool calls are dispatched through a typed command table
//! ([`PlotCommand`] matched by [`PlotViewer::execute`]) with explicit
//! argument validation, rather than evaluating a free-form expression
//! string against the viewer.
//!
//! Rendering a PNG for LLM vision is left pluggable: [`PlotRenderer`] is
//! a trait with a no-op default ([`NullRenderer`]) rather than a
//! fabricated plotting dependency, so a real backend can be wired in
//! without touching the harness logic.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub use labeling_types::ToolResult;
use labeling_types::ToolSchema;

/// One channel's full-resolution data, carried alongside the shared x
/// axis for the life of an agent run.
#[derive(Debug, Clone)]
pub struct ChannelSeries {
    pub name: String,
    pub unit: Option<String>,
    pub color: Option<String>,
    pub data: Vec<f64>,
}

/// Emitted whenever a tool call changes `current_x_view_range`, so the
/// caller can forward a `plot_view_sync` notification to subscribers.
/// Returned explicitly from [`PlotViewer::execute`] rather than pushed
/// onto a hidden global queue, so the harness has no implicit shared
/// mutable state outside the viewer itself.
#[derive(Debug, Clone, Serialize)]
pub struct ViewSyncEvent {
    pub start_index: usize,
    pub end_index: usize,
    pub y_zoomed: bool,
}

/// A rendering back-end for tool results that want a chart image. The
/// default [`NullRenderer`] always returns `None`, matching a harness
/// that still computes every numeric answer correctly without vision
/// support wired in.
pub trait PlotRenderer: Send + Sync {
    fn render(&self, snapshot: &PlotSnapshot) -> Option<String>;
}

pub struct NullRenderer;

impl PlotRenderer for NullRenderer {
    fn render(&self, _snapshot: &PlotSnapshot) -> Option<String> {
        None
    }
}

/// Encodes raw PNG bytes the way a real [`PlotRenderer`] hands them back
/// to the caller: as the base64 payload a tool result's `fig` field carries.
pub fn encode_png_base64(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// What a renderer needs to draw a frame: the visible x/y window plus
/// the series to plot, already sliced to the relevant range.
pub struct PlotSnapshot<'a> {
    pub x: &'a [f64],
    pub series: Vec<(&'a str, &'a [f64])>,
    pub y_range: Option<(f64, f64)>,
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "name", content = "args", rename_all = "snake_case")]
pub enum PlotCommand {
    PlotAll,
    PlotWindow {
        start: i64,
        end: i64,
        #[serde(default)]
        y_zoomed: bool,
    },
    PlotWindowWithWindowSize {
        mid: i64,
        size: i64,
        #[serde(default)]
        y_zoomed: bool,
    },
    PlotLeft,
    PlotRight,
    PlotZoomInX,
    PlotZoomOutX,
    PlotZoomInY,
    PlotZoomOutY,
    PlotDerivative {
        channels: Vec<String>,
    },
    PlotSecondDerivative {
        channels: Vec<String>,
    },
    PlotWithYRanges {
        ranges: HashMap<String, (f64, f64)>,
    },
    LookupX {
        idxs: Vec<i64>,
    },
    LookupY {
        channel: String,
        ys: Vec<f64>,
    },
    GetValue,
}

/// Rows beyond this count in `get_value()`'s table are resampled down to it.
const MAX_TABLE_ROWS: usize = 200;
/// Navigation shift fraction for `plot_left`/`plot_right`.
const NAV_SHIFT_RATIO: f64 = 0.75;
const ZOOM_FACTOR: f64 = 2.0;
/// Padding applied to the full-dataset and window y-ranges `y_zoomed`
/// toggles between.
const Y_RANGE_PADDING: f64 = 0.1;
/// Padding applied to the explicit ranges `plot_with_y_ranges` is given.
const EXPLICIT_Y_RANGE_PADDING: f64 = 0.05;

pub struct PlotViewer {
    pub x: Vec<f64>,
    pub channels: Vec<ChannelSeries>,
    pub current_x_view_range: (usize, usize),
    /// Whether the y-axis is adapted to the current window (`true`) or
    /// shows the full dataset's padded range (`false`). A plain boolean
    /// toggle, not a compounding zoom level: `plot_zoom_in_y`/
    /// `plot_zoom_out_y` flip it once and no-op on repeat calls.
    pub y_zoomed: bool,
    /// The full dataset's ±10%-padded y-range per channel, computed once.
    original_y_ranges: HashMap<String, (f64, f64)>,
    renderer: Box<dyn PlotRenderer>,
}

impl PlotViewer {
    pub fn new(x: Vec<f64>, channels: Vec<ChannelSeries>) -> Self {
        Self::with_renderer(x, channels, Box::new(NullRenderer))
    }

    pub fn with_renderer(x: Vec<f64>, channels: Vec<ChannelSeries>, renderer: Box<dyn PlotRenderer>) -> Self {
        let original_y_ranges = channels
            .iter()
            .map(|c| (c.name.clone(), pad_range(min_max(&c.data), Y_RANGE_PADDING)))
            .collect();
        let n = x.len();
        Self {
            x,
            channels,
            current_x_view_range: (0, n),
            y_zoomed: false,
            original_y_ranges,
            renderer,
        }
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    fn clamp_range(&self, start: i64, end: i64) -> (usize, usize) {
        let n = self.len() as i64;
        let start = start.clamp(0, n);
        let end = end.clamp(start, n);
        (start as usize, end as usize)
    }

    fn channel(&self, name: &str) -> Option<&ChannelSeries> {
        self.channels.iter().find(|c| c.name == name)
    }

    fn set_view(&mut self, start: usize, end: usize, y_zoomed: bool) -> Option<ViewSyncEvent> {
        let changed = self.current_x_view_range != (start, end) || self.y_zoomed != y_zoomed;
        self.current_x_view_range = (start, end);
        self.y_zoomed = y_zoomed;
        changed.then(|| ViewSyncEvent {
            start_index: start,
            end_index: end,
            y_zoomed,
        })
    }

    /// The current window's ±10%-padded y-range per channel, the range
    /// `plot_zoom_in_y` adapts the view to.
    fn window_y_ranges(&self) -> HashMap<String, (f64, f64)> {
        let (start, end) = self.current_x_view_range;
        self.channels
            .iter()
            .map(|c| (c.name.clone(), pad_range(min_max(&c.data[start..end]), Y_RANGE_PADDING)))
            .collect()
    }

    fn merged_range(ranges: &HashMap<String, (f64, f64)>) -> Option<(f64, f64)> {
        let (mut lo, mut hi) = (f64::INFINITY, f64::NEG_INFINITY);
        for (cmin, cmax) in ranges.values() {
            lo = lo.min(*cmin);
            hi = hi.max(*cmax);
        }
        (lo.is_finite() && hi.is_finite()).then_some((lo, hi))
    }

    fn snapshot(&self, title: String) -> PlotSnapshot<'_> {
        let (start, end) = self.current_x_view_range;
        let y_range = if self.y_zoomed {
            Self::merged_range(&self.window_y_ranges())
        } else {
            Self::merged_range(&self.original_y_ranges)
        };
        PlotSnapshot {
            x: &self.x[start..end],
            series: self
                .channels
                .iter()
                .map(|c| (c.name.as_str(), &c.data[start..end]))
                .collect(),
            y_range,
            title,
        }
    }

    /// Dispatches one command, returning the tool's answer plus an
    /// optional view-sync notification. Never returns `Err` to the
    /// caller: malformed requests (unknown channel, empty view) surface
    /// as an error message in `desc` so the orchestrator's stall-recovery
    /// path can let the model see and correct its own mistake.
    pub fn execute(&mut self, command: PlotCommand) -> (ToolResult, Option<ViewSyncEvent>) {
        match command {
            PlotCommand::PlotAll => self.plot_all(),
            PlotCommand::PlotWindow { start, end, y_zoomed } => self.plot_window(start, end, y_zoomed),
            PlotCommand::PlotWindowWithWindowSize { mid, size, y_zoomed } => {
                self.plot_window_with_window_size(mid, size, y_zoomed)
            }
            PlotCommand::PlotLeft => self.plot_left(),
            PlotCommand::PlotRight => self.plot_right(),
            PlotCommand::PlotZoomInX => self.plot_zoom_in_x(),
            PlotCommand::PlotZoomOutX => self.plot_zoom_out_x(),
            PlotCommand::PlotZoomInY => self.plot_zoom_in_y(),
            PlotCommand::PlotZoomOutY => self.plot_zoom_out_y(),
            PlotCommand::PlotDerivative { channels } => self.plot_derivative(&channels, 1),
            PlotCommand::PlotSecondDerivative { channels } => self.plot_derivative(&channels, 2),
            PlotCommand::PlotWithYRanges { ranges } => self.plot_with_y_ranges(ranges),
            PlotCommand::LookupX { idxs } => (self.lookup_x(&idxs), None),
            PlotCommand::LookupY { channel, ys } => (self.lookup_y(&channel, &ys), None),
            PlotCommand::GetValue => (self.get_value(), None),
        }
    }

    pub fn plot_all(&mut self) -> (ToolResult, Option<ViewSyncEvent>) {
        let n = self.len();
        let sync = self.set_view(0, n, false);
        let snapshot = self.snapshot("full dataset".to_string());
        let fig = self.renderer.render(&snapshot);
        (
            ToolResult {
                desc: format!("Showing the full dataset: {n} points across {} channel(s).", self.channels.len()),
                fig,
            },
            sync,
        )
    }

    pub fn plot_window(&mut self, start: i64, end: i64, y_zoomed: bool) -> (ToolResult, Option<ViewSyncEvent>) {
        let (start, end) = self.clamp_range(start, end);
        let sync = self.set_view(start, end, y_zoomed);
        let snapshot = self.snapshot(format!("window [{start}, {end})"));
        let fig = self.renderer.render(&snapshot);
        (
            ToolResult {
                desc: format!("Showing indices [{start}, {end}) ({} points).", end - start),
                fig,
            },
            sync,
        )
    }

    pub fn plot_window_with_window_size(
        &mut self,
        mid: i64,
        size: i64,
        y_zoomed: bool,
    ) -> (ToolResult, Option<ViewSyncEvent>) {
        let half = size.max(0) / 2;
        self.plot_window(mid - half, mid + half, y_zoomed)
    }

    pub fn plot_left(&mut self) -> (ToolResult, Option<ViewSyncEvent>) {
        let (start, end) = self.current_x_view_range;
        let width = (end - start) as f64;
        let shift = (width * NAV_SHIFT_RATIO).round() as i64;
        self.plot_window(start as i64 - shift, end as i64 - shift, self.y_zoomed)
    }

    pub fn plot_right(&mut self) -> (ToolResult, Option<ViewSyncEvent>) {
        let (start, end) = self.current_x_view_range;
        let width = (end - start) as f64;
        let shift = (width * NAV_SHIFT_RATIO).round() as i64;
        self.plot_window(start as i64 + shift, end as i64 + shift, self.y_zoomed)
    }

    pub fn plot_zoom_in_x(&mut self) -> (ToolResult, Option<ViewSyncEvent>) {
        let (start, end) = self.current_x_view_range;
        let mid = (start + end) as f64 / 2.0;
        let half_width = (end - start) as f64 / 2.0 / ZOOM_FACTOR;
        self.plot_window((mid - half_width).round() as i64, (mid + half_width).round() as i64, self.y_zoomed)
    }

    pub fn plot_zoom_out_x(&mut self) -> (ToolResult, Option<ViewSyncEvent>) {
        let (start, end) = self.current_x_view_range;
        let mid = (start + end) as f64 / 2.0;
        let half_width = (end - start) as f64 / 2.0 * ZOOM_FACTOR;
        self.plot_window((mid - half_width).round() as i64, (mid + half_width).round() as i64, self.y_zoomed)
    }

    /// Adapts the y-axis to the current window's data range. A no-op if
    /// already zoomed in: repeat calls don't compound.
    pub fn plot_zoom_in_y(&mut self) -> (ToolResult, Option<ViewSyncEvent>) {
        if self.y_zoomed {
            return (
                ToolResult {
                    desc: "STATUS: Already zoomed in (y-axis adapted to window data)".to_string(),
                    fig: None,
                },
                None,
            );
        }
        let (start, end) = self.current_x_view_range;
        let sync = self.set_view(start, end, true);
        let snapshot = self.snapshot(format!("window [{start}, {end}), y-zoomed"));
        let fig = self.renderer.render(&snapshot);
        (
            ToolResult {
                desc: format!("Showing indices [{start}, {end}) with the y-axis adapted to this window."),
                fig,
            },
            sync,
        )
    }

    /// Resets the y-axis to the full dataset's padded range. A no-op if
    /// already zoomed out.
    pub fn plot_zoom_out_y(&mut self) -> (ToolResult, Option<ViewSyncEvent>) {
        if !self.y_zoomed {
            return (
                ToolResult {
                    desc: "STATUS: Already zoomed out (y-axis shows full dataset range)".to_string(),
                    fig: None,
                },
                None,
            );
        }
        let (start, end) = self.current_x_view_range;
        let sync = self.set_view(start, end, false);
        let snapshot = self.snapshot(format!("window [{start}, {end}), full y-range"));
        let fig = self.renderer.render(&snapshot);
        (
            ToolResult {
                desc: format!("Showing indices [{start}, {end}) with the y-axis reset to the full dataset range."),
                fig,
            },
            sync,
        )
    }

    /// Renders the current window against caller-supplied y-ranges
    /// (±5% padded), without touching `current_x_view_range`/`y_zoomed` —
    /// a one-off custom view, not a new persisted zoom state.
    pub fn plot_with_y_ranges(&mut self, ranges: HashMap<String, (f64, f64)>) -> (ToolResult, Option<ViewSyncEvent>) {
        let padded: HashMap<String, (f64, f64)> = ranges
            .into_iter()
            .map(|(name, range)| (name, pad_range(range, EXPLICIT_Y_RANGE_PADDING)))
            .collect();
        let (start, end) = self.current_x_view_range;
        let snapshot = PlotSnapshot {
            x: &self.x[start..end],
            series: self
                .channels
                .iter()
                .map(|c| (c.name.as_str(), &c.data[start..end]))
                .collect(),
            y_range: Self::merged_range(&padded),
            title: "custom y-ranges".to_string(),
        };
        let fig = self.renderer.render(&snapshot);
        let mut ranges_desc: Vec<String> = padded
            .iter()
            .map(|(name, (lo, hi))| format!("{name}: [{lo:.3}, {hi:.3}]"))
            .collect();
        ranges_desc.sort();
        (
            ToolResult {
                desc: format!(
                    "CUSTOM_Y_RANGES: Window [{start}, {end})\nY_AXIS: Custom ranges applied\nCUSTOM_RANGES: {}",
                    ranges_desc.join("; ")
                ),
                fig,
            },
            None,
        )
    }

    pub fn plot_derivative(&mut self, channel_names: &[String], order: u8) -> (ToolResult, Option<ViewSyncEvent>) {
        let mut missing = Vec::new();
        let mut derived: Vec<(String, Vec<f64>)> = Vec::new();
        for name in channel_names {
            match self.channel(name) {
                Some(ch) => {
                    let mut series = ch.data.clone();
                    for _ in 0..order {
                        series = derivative(&self.x, &series);
                    }
                    let label = if order == 1 { format!("d{name}/dx") } else { format!("d2{name}/dx2") };
                    derived.push((label, series));
                }
                None => missing.push(name.clone()),
            }
        }

        if derived.is_empty() {
            return (
                ToolResult {
                    desc: format!("No known channels among {:?} to differentiate.", channel_names),
                    fig: None,
                },
                None,
            );
        }

        let (start, end) = self.current_x_view_range;
        let x_slice = &self.x[start..end];
        let series: Vec<(&str, &[f64])> = derived
            .iter()
            .map(|(name, data)| (name.as_str(), &data[start.min(data.len())..end.min(data.len())]))
            .collect();
        let snapshot = PlotSnapshot {
            x: x_slice,
            series,
            y_range: None,
            title: format!("order-{order} derivative"),
        };
        let fig = self.renderer.render(&snapshot);

        let mut desc = format!(
            "Computed order-{order} derivative for {} channel(s) over the current view.",
            derived.len()
        );
        if !missing.is_empty() {
            desc.push_str(&format!(" Unknown channels ignored: {:?}.", missing));
        }
        (ToolResult { desc, fig }, None)
    }

    /// Interpolated x→value lookups at the given sample indices.
    pub fn lookup_x(&self, idxs: &[i64]) -> ToolResult {
        let n = self.len();
        let mut lines = Vec::new();
        for &idx in idxs {
            let clamped = idx.clamp(0, n.saturating_sub(1) as i64) as usize;
            let mut row = format!("x={:.6}", self.x.get(clamped).copied().unwrap_or(f64::NAN));
            for ch in &self.channels {
                row.push_str(&format!(", {}={:.6}", ch.name, ch.data.get(clamped).copied().unwrap_or(f64::NAN)));
            }
            lines.push(format!("[{clamped}] {row}"));
        }
        ToolResult {
            desc: lines.join("\n"),
            fig: None,
        }
    }

    /// Finds indices where `channel` crosses each target value in `ys`,
    /// linearly interpolating the fractional crossing position between
    /// the two bracketing samples.
    pub fn lookup_y(&self, channel: &str, ys: &[f64]) -> ToolResult {
        let Some(ch) = self.channel(channel) else {
            return ToolResult {
                desc: format!("Unknown channel `{channel}`."),
                fig: None,
            };
        };

        let mut lines = Vec::new();
        for &target in ys {
            let crossings = find_crossings(&self.x, &ch.data, target);
            if crossings.is_empty() {
                lines.push(format!("{channel} never crosses {target}"));
            } else {
                let formatted: Vec<String> = crossings.iter().map(|x| format!("{x:.6}")).collect();
                lines.push(format!("{channel} crosses {target} at x = [{}]", formatted.join(", ")));
            }
        }
        ToolResult {
            desc: lines.join("\n"),
            fig: None,
        }
    }

    /// A text table of the current window, downsampled to at most
    /// `MAX_TABLE_ROWS` rows by uniform stride.
    pub fn get_value(&self) -> ToolResult {
        let (start, end) = self.current_x_view_range;
        let width = end - start;
        if width == 0 {
            return ToolResult {
                desc: "Current view is empty.".to_string(),
                fig: None,
            };
        }

        let step = (width as f64 / MAX_TABLE_ROWS as f64).ceil().max(1.0) as usize;
        let header = std::iter::once("x".to_string())
            .chain(self.channels.iter().map(|c| c.name.clone()))
            .collect::<Vec<_>>()
            .join("\t");
        let mut rows = vec![header];
        let mut i = start;
        while i < end {
            let mut row = vec![format!("{:.6}", self.x[i])];
            for ch in &self.channels {
                row.push(format!("{:.6}", ch.data[i]));
            }
            rows.push(row.join("\t"));
            i += step;
        }

        ToolResult {
            desc: rows.join("\n"),
            fig: None,
        }
    }

    /// Summary stats handed to the planner at run init, one entry per
    /// channel plus the shared row/column counts.
    pub fn get_basic_statistics(&self) -> BasicStatistics {
        basic_statistics(&self.channels)
    }
}

/// Per-channel mean/std/min/max. `std` is the sample standard deviation
/// (ddof=1); a single-row channel reports `std = 0.0` rather than NaN.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnStatistics {
    pub name: String,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BasicStatistics {
    pub num_rows: usize,
    pub num_columns: usize,
    pub columns: Vec<ColumnStatistics>,
}

pub fn basic_statistics(channels: &[ChannelSeries]) -> BasicStatistics {
    let num_rows = channels.first().map(|c| c.data.len()).unwrap_or(0);
    let columns = channels
        .iter()
        .map(|c| {
            let (min, max) = min_max(&c.data);
            ColumnStatistics {
                name: c.name.clone(),
                mean: mean(&c.data),
                std: sample_std(&c.data),
                min,
                max,
            }
        })
        .collect();
    BasicStatistics {
        num_rows,
        num_columns: channels.len(),
        columns,
    }
}

fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

fn sample_std(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let m = mean(data);
    let sum_sq = data.iter().map(|v| (v - m).powi(2)).sum::<f64>();
    (sum_sq / (data.len() - 1) as f64).sqrt()
}

fn min_max(data: &[f64]) -> (f64, f64) {
    data.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
        (lo.min(v), hi.max(v))
    })
}

/// Pads a `(min, max)` range by `fraction` of its span on each side.
fn pad_range((lo, hi): (f64, f64), fraction: f64) -> (f64, f64) {
    let span = hi - lo;
    (lo - fraction * span, hi + fraction * span)
}

fn derivative(x: &[f64], y: &[f64]) -> Vec<f64> {
    if y.len() < 2 {
        return vec![0.0; y.len()];
    }
    let mut out = Vec::with_capacity(y.len());
    for i in 0..y.len() {
        let (x0, y0, x1, y1) = if i == 0 {
            (x[0], y[0], x[1], y[1])
        } else if i == y.len() - 1 {
            (x[i - 1], y[i - 1], x[i], y[i])
        } else {
            (x[i - 1], y[i - 1], x[i + 1], y[i + 1])
        };
        let dx = x1 - x0;
        out.push(if dx.abs() > f64::EPSILON { (y1 - y0) / dx } else { 0.0 });
    }
    out
}

fn find_crossings(x: &[f64], y: &[f64], target: f64) -> Vec<f64> {
    let mut out = Vec::new();
    for window in y.windows(2).enumerate() {
        let (i, pair) = window;
        let (y0, y1) = (pair[0], pair[1]);
        let crosses = (y0 - target) * (y1 - target) <= 0.0 && y0 != y1;
        if crosses {
            let t = (target - y0) / (y1 - y0);
            out.push(x[i] + t * (x[i + 1] - x[i]));
        }
    }
    out
}

/// Tool schemas exposed to the LLM for function-calling, shared across
/// the planner/identifier/validator providers.
pub fn tool_schemas() -> Vec<ToolSchema> {
    use serde_json::json;
    vec![
        ToolSchema {
            name: "plot_all".into(),
            description: "Plot the entire dataset at full x-range.".into(),
            parameters: json!({"type": "object", "properties": {}}),
        },
        ToolSchema {
            name: "plot_window".into(),
            description: "Plot a specific index window [start, end).".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "start": {"type": "integer"},
                    "end": {"type": "integer"},
                    "y_zoomed": {"type": "boolean"}
                },
                "required": ["start", "end"]
            }),
        },
        ToolSchema {
            name: "plot_window_with_window_size".into(),
            description: "Plot a window centered on `mid` with the given index `size`.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "mid": {"type": "integer"},
                    "size": {"type": "integer"},
                    "y_zoomed": {"type": "boolean"}
                },
                "required": ["mid", "size"]
            }),
        },
        ToolSchema {
            name: "plot_left".into(),
            description: "Shift the current view left by 3/4 of its width.".into(),
            parameters: json!({"type": "object", "properties": {}}),
        },
        ToolSchema {
            name: "plot_right".into(),
            description: "Shift the current view right by 3/4 of its width.".into(),
            parameters: json!({"type": "object", "properties": {}}),
        },
        ToolSchema {
            name: "plot_zoom_in_x".into(),
            description: "Halve the visible x-range around its center.".into(),
            parameters: json!({"type": "object", "properties": {}}),
        },
        ToolSchema {
            name: "plot_zoom_out_x".into(),
            description: "Double the visible x-range around its center.".into(),
            parameters: json!({"type": "object", "properties": {}}),
        },
        ToolSchema {
            name: "plot_zoom_in_y".into(),
            description: "Halve the visible y-range for every channel.".into(),
            parameters: json!({"type": "object", "properties": {}}),
        },
        ToolSchema {
            name: "plot_zoom_out_y".into(),
            description: "Double the visible y-range for every channel.".into(),
            parameters: json!({"type": "object", "properties": {}}),
        },
        ToolSchema {
            name: "plot_derivative".into(),
            description: "Plot the first derivative of the named channels over the current view.".into(),
            parameters: json!({
                "type": "object",
                "properties": {"channels": {"type": "array", "items": {"type": "string"}}},
                "required": ["channels"]
            }),
        },
        ToolSchema {
            name: "plot_second_derivative".into(),
            description: "Plot the second derivative of the named channels over the current view.".into(),
            parameters: json!({
                "type": "object",
                "properties": {"channels": {"type": "array", "items": {"type": "string"}}},
                "required": ["channels"]
            }),
        },
        ToolSchema {
            name: "plot_with_y_ranges".into(),
            description: "Apply explicit y-axis ranges per channel name.".into(),
            parameters: json!({
                "type": "object",
                "properties": {"ranges": {"type": "object"}},
                "required": ["ranges"]
            }),
        },
        ToolSchema {
            name: "lookup_x".into(),
            description: "Look up x and channel values at the given sample indices.".into(),
            parameters: json!({
                "type": "object",
                "properties": {"idxs": {"type": "array", "items": {"type": "integer"}}},
                "required": ["idxs"]
            }),
        },
        ToolSchema {
            name: "lookup_y".into(),
            description: "Find interpolated x positions where a channel crosses given values.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "channel": {"type": "string"},
                    "ys": {"type": "array", "items": {"type": "number"}}
                },
                "required": ["channel", "ys"]
            }),
        },
        ToolSchema {
            name: "get_value".into(),
            description: "Return a text table of the current view, downsampled if too large.".into(),
            parameters: json!({"type": "object", "properties": {}}),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewer() -> PlotViewer {
        let x: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let ch = ChannelSeries {
            name: "a".into(),
            unit: None,
            color: None,
            data: x.iter().map(|v| v.sin()).collect(),
        };
        PlotViewer::new(x, vec![ch])
    }

    #[test]
    fn basic_statistics_reports_mean_std_min_max_per_channel() {
        let channels = vec![ChannelSeries {
            name: "temp".into(),
            unit: None,
            color: None,
            data: vec![1.0, 2.0, 3.0, 4.0],
        }];
        let stats = basic_statistics(&channels);
        assert_eq!(stats.num_rows, 4);
        assert_eq!(stats.num_columns, 1);
        let col = &stats.columns[0];
        assert_eq!(col.name, "temp");
        assert_eq!(col.mean, 2.5);
        assert!((col.std - 1.290_994_448_735_806).abs() < 1e-9);
        assert_eq!(col.min, 1.0);
        assert_eq!(col.max, 4.0);
    }

    #[test]
    fn basic_statistics_single_row_has_zero_std() {
        let channels = vec![ChannelSeries {
            name: "a".into(),
            unit: None,
            color: None,
            data: vec![5.0],
        }];
        let stats = basic_statistics(&channels);
        assert_eq!(stats.columns[0].std, 0.0);
    }

    #[test]
    fn plot_all_covers_whole_dataset() {
        let mut v = viewer();
        let (result, sync) = v.plot_all();
        assert_eq!(v.current_x_view_range, (0, 100));
        assert!(result.desc.contains("100 points"));
        assert!(sync.is_some());
    }

    #[test]
    fn plot_window_clamps_to_bounds() {
        let mut v = viewer();
        let (_, sync) = v.plot_window(-50, 500, false);
        assert_eq!(v.current_x_view_range, (0, 100));
        assert!(sync.is_some());
    }

    #[test]
    fn repeated_identical_command_emits_no_second_sync() {
        let mut v = viewer();
        v.plot_window(10, 20, false);
        let (_, sync) = v.plot_window(10, 20, false);
        assert!(sync.is_none());
    }

    #[test]
    fn plot_left_and_right_shift_by_three_quarters_width() {
        let mut v = viewer();
        v.plot_window(40, 60, false);
        v.plot_right();
        assert_eq!(v.current_x_view_range, (55, 75));
        v.plot_left();
        assert_eq!(v.current_x_view_range, (40, 60));
    }

    #[test]
    fn zoom_in_x_halves_width_around_center() {
        let mut v = viewer();
        v.plot_window(0, 100, false);
        v.plot_zoom_in_x();
        let (start, end) = v.current_x_view_range;
        assert_eq!(end - start, 50);
    }

    #[test]
    fn lookup_y_finds_interpolated_crossing() {
        let x = vec![0.0, 1.0, 2.0, 3.0];
        let y = vec![0.0, 2.0, 4.0, 6.0];
        let ch = ChannelSeries { name: "a".into(), unit: None, color: None, data: y };
        let v = PlotViewer::new(x, vec![ch]);
        let result = v.lookup_y("a", &[3.0]);
        assert!(result.desc.contains("1.5"));
    }

    #[test]
    fn lookup_y_unknown_channel_is_reported_not_panicked() {
        let v = viewer();
        let result = v.lookup_y("missing", &[1.0]);
        assert!(result.desc.contains("Unknown channel"));
    }

    #[test]
    fn get_value_downsamples_large_windows() {
        let x: Vec<f64> = (0..10_000).map(|i| i as f64).collect();
        let ch = ChannelSeries { name: "a".into(), unit: None, color: None, data: x.clone() };
        let mut v = PlotViewer::new(x, vec![ch]);
        v.plot_all();
        let result = v.get_value();
        let rows = result.desc.lines().count();
        assert!(rows <= MAX_TABLE_ROWS + 1);
    }

    #[test]
    fn execute_dispatches_plot_all() {
        let mut v = viewer();
        let (result, _) = v.execute(PlotCommand::PlotAll);
        assert!(result.desc.contains("full dataset"));
    }

    #[test]
    fn encode_png_base64_round_trips_via_standard_alphabet() {
        let encoded = encode_png_base64(&[0x89, b'P', b'N', b'G']);
        assert_eq!(encoded, "iVBORw==");
    }

    #[test]
    fn zoom_in_y_then_repeat_is_a_no_op() {
        let mut v = viewer();
        v.plot_window(10, 20, false);
        let (first, sync) = v.plot_zoom_in_y();
        assert!(v.y_zoomed);
        assert!(sync.is_some());
        assert!(!first.desc.starts_with("STATUS"));

        let (second, sync) = v.plot_zoom_in_y();
        assert!(sync.is_none());
        assert!(second.desc.contains("Already zoomed in"));
    }

    #[test]
    fn zoom_out_y_restores_full_range_and_then_no_ops() {
        let mut v = viewer();
        v.plot_window(10, 20, false);
        v.plot_zoom_in_y();

        let (first, sync) = v.plot_zoom_out_y();
        assert!(!v.y_zoomed);
        assert!(sync.is_some());
        assert!(!first.desc.starts_with("STATUS"));

        let (second, sync) = v.plot_zoom_out_y();
        assert!(sync.is_none());
        assert!(second.desc.contains("Already zoomed out"));
    }

    #[test]
    fn plot_with_y_ranges_pads_by_five_percent_without_changing_zoom_state() {
        let mut v = viewer();
        v.plot_window(0, 100, false);
        let mut ranges = HashMap::new();
        ranges.insert("a".to_string(), (0.0, 10.0));
        let (result, sync) = v.plot_with_y_ranges(ranges);
        assert!(sync.is_none());
        assert!(!v.y_zoomed);
        assert!(result.desc.contains("a: [-0.500, 10.500]"));
    }

    #[test]
    fn tool_schemas_cover_every_operation() {
        let names: Vec<&str> = tool_schemas().iter().map(|s| s.name.as_str()).collect();
        for expected in [
            "plot_all", "plot_window", "plot_window_with_window_size", "plot_left", "plot_right",
            "plot_zoom_in_x", "plot_zoom_out_x", "plot_zoom_in_y", "plot_zoom_out_y",
            "plot_derivative", "plot_second_derivative", "plot_with_y_ranges", "lookup_x",
            "lookup_y", "get_value",
        ] {
            assert!(names.contains(&expected), "missing schema for {expected}");
        }
    }
}
