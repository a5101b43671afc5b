use nalgebra::Vector3;
use trical::Calibrator;

const FIELD_NORM: f64 = 50.0; // expected field magnitude in uT
const NOISE: f64 = 0.1; // per-axis noise standard deviation in uT

fn main() {
    let mut calibrator = Calibrator::new(FIELD_NORM, NOISE).unwrap();

    for step in 0..10 {
        // this loop should repeat each time new magnetometer data is available
        let angle = f64::from(step) * 0.6;
        let magnetometer = Vector3::new(
            55.0 * angle.cos() + 4.0,
            48.0 * angle.sin() - 2.5,
            8.0,
        ); // replace this with actual magnetometer data

        calibrator.update(magnetometer);

        let calibrated = calibrator.calibrate(magnetometer);
        println!(
            "X: {:.2}, Y: {:.2}, Z: {:.2}, |m|: {:.2}",
            calibrated.x,
            calibrated.y,
            calibrated.z,
            calibrated.norm()
        );
    }
}
