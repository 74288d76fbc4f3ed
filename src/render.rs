//! SVG artifacts: correlation heat map, confusion matrices, ROC curve and
//! network topology

use plotters::prelude::*;
use std::fmt::Display;
use std::path::Path;
use tracing::info;

use crate::insight_core::correlation::CorrelationMatrix;
use crate::insight_core::metrics::{Evaluation, RocCurve};
use crate::insight_core::neural::MlpWeights;
use crate::dataset::Diagnosis;
use crate::utils::AnalysisError;

fn render_err<E: Display>(err: E) -> AnalysisError {
    AnalysisError::RenderError(err.to_string())
}

/// Diverging palette: blue for -1, white for 0, red for +1
fn correlation_colour(r: f64) -> RGBColor {
    let fade = |v: f64| (255.0 * (1.0 - v.abs().min(1.0))).round() as u8;
    if r >= 0.0 {
        RGBColor(255, fade(r), fade(r))
    } else {
        RGBColor(fade(r), fade(r), 255)
    }
}

/// Heat map of a (possibly reordered) correlation matrix
pub fn render_correlation_heatmap(
    matrix: &CorrelationMatrix,
    path: &Path,
) -> Result<(), AnalysisError> {
    let n = matrix.len();
    let side = 220 + 22 * n as u32;
    let root = SVGBackend::new(path, (side + 40, side)).into_drawing_area();
    root.fill(&WHITE).map_err(render_err)?;

    let label = |v: &i32| -> String {
        matrix
            .names
            .get(*v as usize)
            .cloned()
            .unwrap_or_default()
    };
    let row_label = |v: &i32| -> String {
        (n as i32 - 1 - *v)
            .try_into()
            .ok()
            .and_then(|i: usize| matrix.names.get(i).cloned())
            .unwrap_or_default()
    };

    let mut chart = ChartBuilder::on(&root)
        .caption("Feature correlation", ("sans-serif", 22))
        .margin(10)
        .x_label_area_size(170)
        .y_label_area_size(170)
        .build_cartesian_2d(0..n as i32, 0..n as i32)
        .map_err(render_err)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(n)
        .y_labels(n)
        .x_label_formatter(&label)
        .y_label_formatter(&row_label)
        .label_style(("sans-serif", 11))
        .draw()
        .map_err(render_err)?;

    chart
        .draw_series(matrix.values.indexed_iter().map(|((i, j), &r)| {
            let x = j as i32;
            let y = (n - 1 - i) as i32;
            Rectangle::new([(x, y), (x + 1, y + 1)], correlation_colour(r).filled())
        }))
        .map_err(render_err)?;

    root.present().map_err(render_err)?;
    info!(path = %path.display(), variables = n, "rendered correlation heat map");
    Ok(())
}

/// 2x2 confusion matrix tiles shaded by count
pub fn render_confusion_matrix(evaluation: &Evaluation, path: &Path) -> Result<(), AnalysisError> {
    let root = SVGBackend::new(path, (520, 520)).into_drawing_area();
    root.fill(&WHITE).map_err(render_err)?;

    let title = format!(
        "{}: accuracy {:.3}",
        evaluation.model, evaluation.accuracy
    );
    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 22))
        .margin(20)
        .build_cartesian_2d(0f64..2f64, 0f64..2f64)
        .map_err(render_err)?;

    let cm = &evaluation.confusion;
    let total = cm.total().max(1) as f64;
    // columns = actual, rows = predicted (malignant on top)
    let mut cells = Vec::new();
    for (ci, actual) in Diagnosis::ALL.iter().enumerate() {
        for (ri, predicted) in Diagnosis::ALL.iter().enumerate() {
            cells.push((ci as f64, ri as f64, *actual, *predicted, cm.get(*predicted, *actual)));
        }
    }

    chart
        .draw_series(cells.iter().map(|&(x, y, _, _, count)| {
            let shade = 255 - (180.0 * count as f64 / total).round() as u8;
            Rectangle::new([(x, y), (x + 1.0, y + 1.0)], RGBColor(shade, shade, 255).filled())
        }))
        .map_err(render_err)?;
    chart
        .draw_series(cells.iter().map(|&(x, y, _, _, count)| {
            Text::new(count.to_string(), (x + 0.42, y + 0.6), ("sans-serif", 34))
        }))
        .map_err(render_err)?;
    chart
        .draw_series(cells.iter().map(|&(x, y, actual, predicted, _)| {
            Text::new(
                format!("pred {} / actual {}", predicted, actual),
                (x + 0.08, y + 0.25),
                ("sans-serif", 12),
            )
        }))
        .map_err(render_err)?;

    root.present().map_err(render_err)?;
    info!(path = %path.display(), model = %evaluation.model, "rendered confusion matrix");
    Ok(())
}

/// ROC curve with the chance diagonal
pub fn render_roc(roc: &RocCurve, title: &str, path: &Path) -> Result<(), AnalysisError> {
    let root = SVGBackend::new(path, (600, 560)).into_drawing_area();
    root.fill(&WHITE).map_err(render_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 22))
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(0f64..1f64, 0f64..1f64)
        .map_err(render_err)?;

    chart
        .configure_mesh()
        .x_desc("False positive rate")
        .y_desc("True positive rate")
        .draw()
        .map_err(render_err)?;

    chart
        .draw_series(LineSeries::new(
            vec![(0.0, 0.0), (1.0, 1.0)],
            &BLACK.mix(0.3),
        ))
        .map_err(render_err)?;
    chart
        .draw_series(LineSeries::new(
            roc.points
                .iter()
                .map(|p| (p.false_positive_rate, p.true_positive_rate)),
            &RED,
        ))
        .map_err(render_err)?
        .label(format!("AUC = {:.3}", roc.auc))
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &RED));

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::LowerRight)
        .background_style(&WHITE)
        .border_style(&BLACK)
        .draw()
        .map_err(render_err)?;

    root.present().map_err(render_err)?;
    info!(path = %path.display(), auc = roc.auc, "rendered ROC curve");
    Ok(())
}

fn layer_positions(count: usize, height: i32, margin: i32) -> Vec<i32> {
    if count == 1 {
        return vec![height / 2];
    }
    let span = (height - 2 * margin) as f64;
    (0..count)
        .map(|i| margin + (span * i as f64 / (count - 1) as f64).round() as i32)
        .collect()
}

/// Topology of the fitted network; edge width follows |weight|, colour its sign
pub fn render_network(
    weights: &MlpWeights,
    input_names: &[String],
    path: &Path,
) -> Result<(), AnalysisError> {
    let n_in = weights.n_inputs();
    let n_hidden = weights.n_hidden();
    let height = (22 * n_in.max(n_hidden) as i32 + 80).max(240);
    let root = SVGBackend::new(path, (900, height as u32)).into_drawing_area();
    root.fill(&WHITE).map_err(render_err)?;

    let (x_in, x_hidden, x_out) = (220, 520, 780);
    let y_in = layer_positions(n_in, height, 40);
    let y_hidden = layer_positions(n_hidden, height, 40);
    let y_out = height / 2;

    let max_w = weights
        .input_hidden
        .iter()
        .chain(weights.hidden_output.iter())
        .fold(0.0_f64, |m, w| m.max(w.abs()))
        .max(f64::MIN_POSITIVE);
    let edge_style = |w: f64| {
        let base = if w >= 0.0 { BLACK } else { RED };
        let alpha = 0.15 + 0.85 * w.abs() / max_w;
        base.mix(alpha).stroke_width(1 + (3.0 * w.abs() / max_w).round() as u32)
    };

    for (h, row) in weights.input_hidden.rows().into_iter().enumerate() {
        for (i, &w) in row.iter().enumerate() {
            root.draw(&PathElement::new(
                vec![(x_in, y_in[i]), (x_hidden, y_hidden[h])],
                edge_style(w),
            ))
            .map_err(render_err)?;
        }
    }
    for (h, &w) in weights.hidden_output.iter().enumerate() {
        root.draw(&PathElement::new(
            vec![(x_hidden, y_hidden[h]), (x_out, y_out)],
            edge_style(w),
        ))
        .map_err(render_err)?;
    }

    for (i, &y) in y_in.iter().enumerate() {
        root.draw(&Circle::new((x_in, y), 6, BLUE.filled()))
            .map_err(render_err)?;
        let name = input_names.get(i).cloned().unwrap_or_else(|| format!("I{}", i + 1));
        root.draw(&Text::new(name, (10, y - 6), ("sans-serif", 12)))
            .map_err(render_err)?;
    }
    for (h, &y) in y_hidden.iter().enumerate() {
        root.draw(&Circle::new((x_hidden, y), 8, GREEN.filled()))
            .map_err(render_err)?;
        root.draw(&Text::new(format!("H{}", h + 1), (x_hidden + 12, y - 6), ("sans-serif", 12)))
            .map_err(render_err)?;
    }
    root.draw(&Circle::new((x_out, y_out), 10, MAGENTA.filled()))
        .map_err(render_err)?;
    root.draw(&Text::new("malignant", (x_out + 16, y_out - 6), ("sans-serif", 14)))
        .map_err(render_err)?;

    root.present().map_err(render_err)?;
    info!(path = %path.display(), inputs = n_in, hidden = n_hidden, "rendered network topology");
    Ok(())
}
