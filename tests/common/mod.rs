// tests/common/mod.rs
// In-process stand-in for the simulator: understands the camera commands the agent
// sends, moves a single camera around, and can be told to block moves, drop replies
// or fail restarts. State is shared so a test can inspect it after the transport has
// been handed to the agent.

#![allow(dead_code)]

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use nalgebra::Vector3;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use ucv_nav::navigation::{Spawn, SpawnContext, SpawnStrategy};
use ucv_nav::sim_interface::protocol;
use ucv_nav::{Transport, UcvConfig, UcvError};

#[derive(Debug, Default)]
pub struct SimState {
    pub location: Vector3<f64>,
    pub rotation: Vector3<f64>,
    /// Upcoming moveto commands that leave the camera where it is
    pub block_moves: usize,
    /// Upcoming requests answered with a dead reply
    pub drop_replies: usize,
    /// Upcoming moveto commands answered with a dead reply
    pub drop_moves: usize,
    /// Restarts come up dead
    pub start_fails: bool,
    pub alive: bool,
    pub starts: usize,
    pub stops: usize,
    pub commands: Vec<String>,
    pub frame_size: (u32, u32),
}

#[derive(Clone)]
pub struct FakeSim {
    pub state: Arc<Mutex<SimState>>,
}

impl FakeSim {
    pub fn new() -> Self {
        FakeSim {
            state: Arc::new(Mutex::new(SimState {
                frame_size: (8, 8),
                ..SimState::default()
            })),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut SimState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.with(|s| s.commands.iter().filter(|c| c.starts_with(prefix)).count())
    }
}

fn numbers(args: &[&str]) -> Vec<f64> {
    args.iter().map(|a| a.parse().unwrap()).collect()
}

impl Transport for FakeSim {
    fn start(&mut self) -> Result<bool, UcvError> {
        self.with(|s| {
            s.starts += 1;
            // A fresh process spawns the camera at the origin
            s.location = Vector3::zeros();
            s.rotation = Vector3::zeros();
            s.alive = !(s.start_fails && s.starts > 1);
            Ok(s.alive)
        })
    }

    fn stop(&mut self) {
        self.with(|s| {
            s.stops += 1;
            s.alive = false;
        });
    }

    fn request(&mut self, message: &str) -> Result<Option<Vec<u8>>, UcvError> {
        self.with(|s| {
            s.commands.push(message.to_string());
            if !s.alive {
                return Ok(None);
            }
            if s.drop_replies > 0 {
                s.drop_replies -= 1;
                s.alive = false;
                return Ok(None);
            }
            if s.drop_moves > 0 && message.starts_with("vset /camera/0/moveto") {
                s.drop_moves -= 1;
                s.alive = false;
                return Ok(None);
            }

            let parts: Vec<&str> = message.split_whitespace().collect();
            let reply = match parts.as_slice() {
                ["vset", "/camera/0/location", args @ ..] => {
                    let v = numbers(args);
                    s.location = Vector3::new(v[0], v[1], v[2]);
                    b"ok".to_vec()
                }
                ["vset", "/camera/0/rotation", args @ ..] => {
                    let v = numbers(args);
                    s.rotation = Vector3::new(v[0], v[1], v[2]);
                    b"ok".to_vec()
                }
                ["vset", "/camera/0/pose", args @ ..] => {
                    let v = numbers(args);
                    s.location = Vector3::new(v[0], v[1], v[2]);
                    s.rotation = Vector3::new(v[3], v[4], v[5]);
                    b"ok".to_vec()
                }
                ["vset", "/camera/0/moveto", args @ ..] => {
                    let v = numbers(args);
                    if s.block_moves > 0 {
                        s.block_moves -= 1;
                    } else {
                        s.location = protocol::round2_vec(&Vector3::new(v[0], v[1], v[2]));
                    }
                    b"ok".to_vec()
                }
                ["vget", "/camera/0/location"] => {
                    format!("{} {} {}", s.location.x, s.location.y, s.location.z).into_bytes()
                }
                ["vget", "/camera/0/rotation"] => {
                    format!("{} {} {}", s.rotation.x, s.rotation.y, s.rotation.z).into_bytes()
                }
                ["vget", "/camera/0/lit", "png"] => png(s.frame_size.0, s.frame_size.1),
                ["vget", "/camera/0/depth", "npy"] => npy_f32(84, 84, |r, _| r as f32 / 12.0),
                _ => b"error: unknown command".to_vec(),
            };
            Ok(Some(reply))
        })
    }

    fn port(&self) -> u16 {
        9000
    }
}

/// Always the same start and goal
pub struct FixedSpawn {
    pub spawn: Spawn,
}

impl FixedSpawn {
    pub fn new(start: Vector3<f64>, goal: Vector3<f64>) -> Box<Self> {
        Box::new(FixedSpawn {
            spawn: Spawn { start, goal },
        })
    }
}

impl SpawnStrategy for FixedSpawn {
    fn plan(&mut self, _heading: f64, _ctx: &mut SpawnContext<'_>) -> Result<Spawn, UcvError> {
        Ok(self.spawn.clone())
    }
}

/// Defaults with every delay zeroed and a fixed seed
pub fn test_config() -> UcvConfig {
    let mut config = UcvConfig::default();
    config.seed = Some(42);
    config.map.spawn_retry_delay_ms = 0;
    config.simulator.init_launch_ms = 0;
    config.simulator.pre_launch_ms = 0;
    config.simulator.launch_settle_ms = 0;
    config.simulator.connect_settle_ms = 0;
    config.simulator.observation_width = 8;
    config.simulator.observation_height = 8;
    config
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, y| Rgba([(x * 30) as u8, (y * 30) as u8, 127, 255]));
    let mut bytes = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(img)
        .write_to(&mut bytes, ImageFormat::Png)
        .unwrap();
    bytes.into_inner()
}

pub fn npy_f32(rows: usize, cols: usize, value: impl Fn(usize, usize) -> f32) -> Vec<u8> {
    let mut header = format!(
        "{{'descr': '<f4', 'fortran_order': False, 'shape': ({}, {}), }}",
        rows, cols
    );
    while (10 + header.len() + 1) % 64 != 0 {
        header.push(' ');
    }
    header.push('\n');

    let mut bytes = b"\x93NUMPY\x01\x00".to_vec();
    bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
    bytes.extend_from_slice(header.as_bytes());
    for r in 0..rows {
        for c in 0..cols {
            bytes.extend_from_slice(&value(r, c).to_le_bytes());
        }
    }
    bytes
}
