//! SVG visualisation of raw and calibrated samples

use std::path::Path;

use nalgebra::Vector3;
use plotters::prelude::*;

/// Axis pairs drawn side by side
const PROJECTIONS: [(usize, usize, &str); 3] = [(0, 1, "X-Y"), (0, 2, "X-Z"), (1, 2, "Y-Z")];

/// Plot every `(raw, calibrated)` pair in three axis projections
///
/// Calibrated samples should fall on the circle of radius `field_norm` drawn in
/// each panel.
pub fn render(
    path: &Path,
    samples: &[(Vector3<f64>, Vector3<f64>)],
    field_norm: f64,
) -> anyhow::Result<()> {
    let extent = samples
        .iter()
        .flat_map(|(raw, calibrated)| [raw.amax(), calibrated.amax()])
        .fold(field_norm, f64::max)
        * 1.1;

    let root = SVGBackend::new(path, (1200, 420)).into_drawing_area();
    root.fill(&WHITE)?;

    let panels = root.split_evenly((1, 3));
    for (panel, &(a, b, title)) in panels.iter().zip(PROJECTIONS.iter()) {
        let mut chart = ChartBuilder::on(panel)
            .caption(title, ("sans-serif", 20))
            .margin(10)
            .x_label_area_size(30)
            .y_label_area_size(40)
            .build_cartesian_2d(-extent..extent, -extent..extent)?;

        chart.configure_mesh().draw()?;

        chart
            .draw_series(
                samples
                    .iter()
                    .map(|(raw, _)| Circle::new((raw[a], raw[b]), 2, RED.mix(0.4).filled())),
            )?
            .label("raw")
            .legend(|(x, y)| Circle::new((x, y), 3, RED.filled()));

        chart
            .draw_series(samples.iter().map(|(_, calibrated)| {
                Circle::new((calibrated[a], calibrated[b]), 2, BLUE.mix(0.4).filled())
            }))?
            .label("calibrated")
            .legend(|(x, y)| Circle::new((x, y), 3, BLUE.filled()));

        chart
            .draw_series(LineSeries::new(
                (0..=360).map(|degrees| {
                    let angle = f64::from(degrees).to_radians();
                    (field_norm * angle.cos(), field_norm * angle.sin())
                }),
                &BLACK,
            ))?
            .label("field norm")
            .legend(|(x, y)| PathElement::new(vec![(x - 8, y), (x + 8, y)], BLACK));

        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
    }

    root.present()?;
    Ok(())
}
