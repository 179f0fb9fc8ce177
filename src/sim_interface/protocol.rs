// src/sim_interface/protocol.rs
// Command strings understood by the simulator's camera endpoint and parsing of the
// short textual replies. Locations are formatted to 2 decimals, rotations to 3.

// Dependencies
use crate::UcvError;
use nalgebra::Vector3;

/// Query the camera location
pub const GET_LOCATION: &str = "vget /camera/0/location";
/// Query the camera rotation
pub const GET_ROTATION: &str = "vget /camera/0/rotation";
/// Color frame as PNG
pub const GET_LIT_PNG: &str = "vget /camera/0/lit png";
/// Depth frame as a numpy array
pub const GET_DEPTH_NPY: &str = "vget /camera/0/depth npy";

/// Teleport to a location (cm)
pub fn set_location(location: &Vector3<f64>) -> String {
    format!(
        "vset /camera/0/location {:.2} {:.2} {:.2}",
        location.x, location.y, location.z
    )
}

/// Set pitch, yaw and roll (degrees)
pub fn set_rotation(rotation: &Vector3<f64>) -> String {
    format!(
        "vset /camera/0/rotation {:.3} {:.3} {:.3}",
        rotation.x, rotation.y, rotation.z
    )
}

/// Move toward a location, stopping at the first obstacle
pub fn move_to(location: &Vector3<f64>) -> String {
    format!(
        "vset /camera/0/moveto {:.2} {:.2} {:.2}",
        location.x, location.y, location.z
    )
}

/// Instant pose used by the spawn probe: integer map cell, level pitch and roll
pub fn probe_pose(x: i32, y: i32, altitude: f64, heading: f64) -> String {
    format!("vset /camera/0/pose {} {} {} 0 {} 0", x, y, altitude, heading)
}

/// Short probe move with unrounded coordinates
pub fn probe_move_to(target: &Vector3<f64>) -> String {
    format!("vset /camera/0/moveto {} {} {}", target.x, target.y, target.z)
}

/// Whether a `vset` reply acknowledges the command
pub fn is_ok(reply: &str) -> bool {
    reply.trim() == "ok"
}

/// Parses a space-separated triple such as `"10.00 -3.50 150.00"`
pub fn parse_vector3(command: &str, reply: &str) -> Result<Vector3<f64>, UcvError> {
    let malformed = || UcvError::MalformedReply {
        command: command.to_string(),
        reply: reply.to_string(),
    };

    let values = reply
        .split_whitespace()
        .map(str::parse::<f64>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| malformed())?;

    match values.as_slice() {
        [x, y, z] => Ok(Vector3::new(*x, *y, *z)),
        _ => Err(malformed()),
    }
}

/// Rounds to 2 decimals, the precision the simulator reports locations with
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Component-wise [`round2`]
pub fn round2_vec(v: &Vector3<f64>) -> Vector3<f64> {
    v.map(round2)
}
