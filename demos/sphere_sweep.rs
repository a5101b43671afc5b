//! Calibrate a distorted sensor swept over the whole sphere and print the
//! result in the batch summary format.

use std::f64::consts::PI;

use nalgebra::{Matrix3, Vector3};
use trical::{Calibrator, protocol};

const SAMPLES: usize = 2000;
const STRIDE: usize = 1231; // coprime with SAMPLES, scrambles the sweep order

fn main() {
    let bias = Vector3::new(0.25, -0.4, 0.1);
    let distortion = Matrix3::new(1.2, 0.05, 0.0, 0.05, 0.9, -0.03, 0.0, -0.03, 1.1);

    let mut calibrator = Calibrator::new(1.0, 1e-4).unwrap();
    let golden_angle = PI * (3.0 - 5.0_f64.sqrt());

    for i in 0..SAMPLES {
        let k = (i * STRIDE) % SAMPLES;
        let y = 1.0 - 2.0 * (k as f64 + 0.5) / SAMPLES as f64;
        let r = (1.0 - y * y).sqrt();
        let theta = k as f64 * golden_angle;
        let field = Vector3::new(r * theta.cos(), y, r * theta.sin());

        calibrator.update(distortion * field + bias);
    }

    let estimate = calibrator.estimate_extended();
    let mut summary = String::new();
    protocol::write_summary(&mut summary, &estimate.estimate).unwrap();
    print!("{}", summary);

    println!("true bias = {:?}", bias.as_slice());
    println!(
        "bias std  = {:?}",
        estimate.bias_variance.map(f64::sqrt).as_slice()
    );
    println!("accepted  = {}", calibrator.measurement_count());
}
