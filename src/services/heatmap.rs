use std::fmt::{self, Write as _};
use palette::Srgb;

use crate::error::AppError;
use crate::models::{CorrelationMatrix, Heatmap, HeatmapCell, TextColor};

pub const COLOR_SCALE: &str = "Viridis";
const Z_MIN: f64 = -1.0;
const Z_MAX: f64 = 1.0;

// Evenly spaced Viridis stops, low to high.
const VIRIDIS: [(u8, u8, u8); 10] = [
    (0x44, 0x01, 0x54),
    (0x48, 0x28, 0x78),
    (0x3e, 0x49, 0x89),
    (0x31, 0x68, 0x8e),
    (0x26, 0x82, 0x8e),
    (0x1f, 0x9e, 0x89),
    (0x35, 0xb7, 0x79),
    (0x6e, 0xce, 0x58),
    (0xb5, 0xde, 0x2b),
    (0xfd, 0xe7, 0x25),
];

const NAN_FILL: &str = "#d9d9d9";

const CELL_SIZE: usize = 64;
const MARGIN_LEFT: usize = 140;
const MARGIN_TOP: usize = 60;
const MARGIN_BOTTOM: usize = 140;
const COLORBAR_WIDTH: usize = 18;
const COLORBAR_GAP: usize = 30;
const COLORBAR_STEPS: usize = 50;

/// Label color for a cell.
///
/// Black only above 0.5; the rule ignores sign, so strong negative
/// coefficients get white text over the dark end of the scale.
pub fn text_color(value: Option<f64>) -> TextColor {
    match value {
        Some(v) if v > 0.5 => TextColor::Black,
        _ => TextColor::White,
    }
}

pub fn format_coefficient(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.2}", v),
        None => "NaN".to_string(),
    }
}

/// Maps a coefficient onto the Viridis scale fixed over [-1, 1].
pub fn fill_color(value: f64) -> Srgb<u8> {
    let t = ((value - Z_MIN) / (Z_MAX - Z_MIN)).clamp(0.0, 1.0) as f32;
    let scaled = t * (VIRIDIS.len() - 1) as f32;
    let lower = (scaled.floor() as usize).min(VIRIDIS.len() - 2);
    let frac = scaled - lower as f32;

    let from: Srgb<f32> = stop(lower).into_format();
    let to: Srgb<f32> = stop(lower + 1).into_format();
    Srgb::new(
        from.red + (to.red - from.red) * frac,
        from.green + (to.green - from.green) * frac,
        from.blue + (to.blue - from.blue) * frac,
    )
    .into_format()
}

fn stop(idx: usize) -> Srgb<u8> {
    let (r, g, b) = VIRIDIS[idx];
    Srgb::new(r, g, b)
}

fn hex(color: Srgb<u8>) -> String {
    format!("#{:02x}{:02x}{:02x}", color.red, color.green, color.blue)
}

fn fill_hex(value: Option<f64>) -> String {
    value
        .map(|v| hex(fill_color(v)))
        .unwrap_or_else(|| NAN_FILL.to_string())
}

/// Builds the chart data: axes, z values and one styled record per cell.
pub fn build_heatmap(matrix: &CorrelationMatrix) -> Heatmap {
    let mut cells = Vec::with_capacity(matrix.len() * matrix.len());
    for (i, x) in matrix.columns.iter().enumerate() {
        for (j, y) in matrix.columns.iter().enumerate() {
            let value = matrix.get(j, i);
            let text = format_coefficient(value);
            cells.push(HeatmapCell {
                x: x.clone(),
                y: y.clone(),
                value,
                hover: format!("{} - {}: {}", x, y, text),
                text_color: text_color(value),
                fill: fill_hex(value),
                text,
            });
        }
    }

    Heatmap {
        title: "Correlation Matrix Heatmap".to_string(),
        x_title: "Features".to_string(),
        y_title: "Features".to_string(),
        colorbar_title: "Correlation".to_string(),
        color_scale: COLOR_SCALE.to_string(),
        zmin: Z_MIN,
        zmax: Z_MAX,
        x: matrix.columns.clone(),
        y: matrix.columns.clone(),
        z: matrix.values.clone(),
        cells,
    }
}

/// Renders the heatmap as a standalone SVG document with hover tooltips.
pub fn render_svg(heatmap: &Heatmap) -> Result<String, AppError> {
    let mut svg = String::new();
    write_svg(&mut svg, heatmap)
        .map_err(|e| AppError::Internal(format!("failed to render heatmap: {}", e)))?;
    Ok(svg)
}

fn write_svg(svg: &mut String, heatmap: &Heatmap) -> fmt::Result {
    let n = heatmap.x.len();
    let grid = n * CELL_SIZE;
    let colorbar_x = MARGIN_LEFT + grid + COLORBAR_GAP;
    let width = colorbar_x + COLORBAR_WIDTH + 90;
    let height = MARGIN_TOP + grid + MARGIN_BOTTOM;

    writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" font-family="sans-serif">"#,
        w = width,
        h = height
    )?;
    writeln!(
        svg,
        r#"<text x="{}" y="30" font-size="18" text-anchor="middle">{}</text>"#,
        MARGIN_LEFT + grid / 2,
        escape_xml(&heatmap.title)
    )?;

    let index = |name: &str, axis: &[String]| axis.iter().position(|c| c == name).unwrap_or(0);
    for cell in &heatmap.cells {
        let cx = MARGIN_LEFT + index(cell.x.as_str(), heatmap.x.as_slice()) * CELL_SIZE;
        // First row of the y axis sits at the bottom, as in a plotted heatmap.
        let cy = MARGIN_TOP + (n - 1 - index(cell.y.as_str(), heatmap.y.as_slice())) * CELL_SIZE;
        writeln!(
            svg,
            r#"<g><title>{hover}</title><rect x="{cx}" y="{cy}" width="{s}" height="{s}" fill="{fill}"/><text x="{tx}" y="{ty}" font-size="12" text-anchor="middle" dominant-baseline="middle" fill="{color}">{text}</text></g>"#,
            hover = escape_xml(&cell.hover),
            cx = cx,
            cy = cy,
            s = CELL_SIZE,
            fill = cell.fill,
            tx = cx + CELL_SIZE / 2,
            ty = cy + CELL_SIZE / 2,
            color = cell.text_color.as_str(),
            text = escape_xml(&cell.text),
        )?;
    }

    for (idx, label) in heatmap.x.iter().enumerate() {
        let x = MARGIN_LEFT + idx * CELL_SIZE + CELL_SIZE / 2;
        let y = MARGIN_TOP + grid + 10;
        writeln!(
            svg,
            r#"<text x="{x}" y="{y}" font-size="12" text-anchor="end" transform="rotate(-45 {x} {y})">{}</text>"#,
            escape_xml(label),
        )?;
    }
    for (idx, label) in heatmap.y.iter().enumerate() {
        let y = MARGIN_TOP + (n - 1 - idx) * CELL_SIZE + CELL_SIZE / 2;
        writeln!(
            svg,
            r#"<text x="{}" y="{}" font-size="12" text-anchor="end" dominant-baseline="middle">{}</text>"#,
            MARGIN_LEFT - 8,
            y,
            escape_xml(label),
        )?;
    }
    writeln!(
        svg,
        r#"<text x="{}" y="{}" font-size="14" text-anchor="middle">{}</text>"#,
        MARGIN_LEFT + grid / 2,
        height - 12,
        escape_xml(&heatmap.x_title)
    )?;
    writeln!(
        svg,
        r#"<text x="20" y="{y}" font-size="14" text-anchor="middle" transform="rotate(-90 20 {y})">{}</text>"#,
        escape_xml(&heatmap.y_title),
        y = MARGIN_TOP + grid / 2,
    )?;

    write_colorbar(svg, heatmap, colorbar_x, grid)?;
    svg.push_str("</svg>\n");
    Ok(())
}

fn write_colorbar(svg: &mut String, heatmap: &Heatmap, x: usize, height: usize) -> fmt::Result {
    let step_height = height as f64 / COLORBAR_STEPS as f64;
    for step in 0..COLORBAR_STEPS {
        let value = heatmap.zmax - (heatmap.zmax - heatmap.zmin) * (step as f64 + 0.5) / COLORBAR_STEPS as f64;
        writeln!(
            svg,
            r#"<rect x="{}" y="{:.2}" width="{}" height="{:.2}" fill="{}"/>"#,
            x,
            MARGIN_TOP as f64 + step as f64 * step_height,
            COLORBAR_WIDTH,
            step_height + 0.5,
            hex(fill_color(value)),
        )?;
    }
    for (label, frac) in [(heatmap.zmax, 0.0), (0.0, 0.5), (heatmap.zmin, 1.0)] {
        writeln!(
            svg,
            r#"<text x="{}" y="{:.0}" font-size="11" dominant-baseline="middle">{:.1}</text>"#,
            x + COLORBAR_WIDTH + 6,
            MARGIN_TOP as f64 + frac * height as f64,
            label,
        )?;
    }
    writeln!(
        svg,
        r#"<text x="{}" y="{}" font-size="12">{}</text>"#,
        x,
        MARGIN_TOP - 10,
        escape_xml(&heatmap.colorbar_title),
    )?;
    Ok(())
}

fn escape_xml(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
