//! 2D canvas placement for generated nodes.
//!
//! Three placement strategies: a square spiral for chained topologies,
//! a rescaled grid for the switch fabrics, and a force-directed pass
//! for random meshes. The declarative document format rejects
//! coordinates beyond a platform ceiling, so grid steps are rescaled
//! and every emitted coordinate is clamped.

use rand::Rng;

/// Largest coordinate the declarative document format accepts.
pub const MAX_COORD: i64 = 15000;

/// Canvas position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

impl Point {
    pub fn new(x: i64, y: i64) -> Point {
        Point { x, y }
    }

    /// Clamp both coordinates into the platform's accepted range.
    pub fn clamped(self) -> Point {
        Point {
            x: self.x.clamp(-MAX_COORD, MAX_COORD),
            y: self.y.clamp(-MAX_COORD, MAX_COORD),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Up,
    Right,
    Down,
    Left,
}

impl Direction {
    fn turn(self) -> Direction {
        match self {
            Direction::Up => Direction::Right,
            Direction::Right => Direction::Down,
            Direction::Down => Direction::Left,
            Direction::Left => Direction::Up,
        }
    }

    fn delta(self, distance: i64) -> (i64, i64) {
        match self {
            Direction::Up => (0, distance),
            Direction::Right => (distance, 0),
            Direction::Down => (0, -distance),
            Direction::Left => (-distance, 0),
        }
    }
}

/// Square spiral walk starting at the origin.
///
/// Directions cycle up, right, down, left; the leg length grows by one
/// after every two turns. The iterator never ends, callers take as many
/// positions as they have nodes.
#[derive(Debug)]
pub struct SpiralCoords {
    distance: i64,
    pos: Point,
    dir: Direction,
    leg: u32,
    remaining: u32,
    legs_done: u32,
}

impl SpiralCoords {
    pub fn new(distance: i64) -> SpiralCoords {
        SpiralCoords {
            distance,
            pos: Point::new(0, 0),
            dir: Direction::Up,
            leg: 1,
            remaining: 1,
            legs_done: 0,
        }
    }
}

impl Iterator for SpiralCoords {
    type Item = Point;

    fn next(&mut self) -> Option<Point> {
        let here = self.pos;
        let (dx, dy) = self.dir.delta(self.distance);
        self.pos = Point::new(self.pos.x + dx, self.pos.y + dy);
        self.remaining -= 1;
        if self.remaining == 0 {
            self.dir = self.dir.turn();
            self.legs_done += 1;
            if self.legs_done % 2 == 0 {
                self.leg += 1;
            }
            self.remaining = self.leg;
        }
        Some(here)
    }
}

/// Horizontal and vertical grid steps for the switch fabrics, rescaled
/// so that `num_access + 1` columns and `rows + 2` rows fit on the
/// canvas. Steps never fall below 1.
pub fn grid_steps(distance: i64, num_access: u32, rows: u32) -> (i64, i64) {
    let step_x = (3 * distance).min(MAX_COORD / (num_access as i64 + 1)).max(1);
    let step_y = distance.min(MAX_COORD / (rows as i64 + 2)).max(1);
    (step_x, step_y)
}

/// Force-directed placement for arbitrary graphs.
///
/// Fruchterman-Reingold style: repulsion between every node pair,
/// attraction along edges, displacement capped by a cooling
/// temperature. Positions are truncated to integers and clamped. Not
/// reproducible across runs.
pub fn force_directed(node_count: usize, edges: &[(usize, usize)], distance: i64) -> Vec<Point> {
    if node_count == 0 {
        return Vec::new();
    }
    let mut rng = rand::thread_rng();
    let span = (distance as f64) * (node_count as f64).sqrt();
    let mut xs: Vec<f64> = (0..node_count).map(|_| rng.gen_range(-span..span)).collect();
    let mut ys: Vec<f64> = (0..node_count).map(|_| rng.gen_range(-span..span)).collect();

    let area = (2.0 * span) * (2.0 * span);
    let k = (area / node_count as f64).sqrt();
    let iterations = 200;
    let mut temp = span;

    for _ in 0..iterations {
        let mut dx = vec![0.0f64; node_count];
        let mut dy = vec![0.0f64; node_count];

        for i in 0..node_count {
            for j in (i + 1)..node_count {
                let ddx = xs[i] - xs[j];
                let ddy = ys[i] - ys[j];
                let dist = (ddx * ddx + ddy * ddy).sqrt().max(0.01);
                let force = k * k / dist;
                dx[i] += ddx / dist * force;
                dy[i] += ddy / dist * force;
                dx[j] -= ddx / dist * force;
                dy[j] -= ddy / dist * force;
            }
        }

        for &(a, b) in edges {
            let ddx = xs[a] - xs[b];
            let ddy = ys[a] - ys[b];
            let dist = (ddx * ddx + ddy * ddy).sqrt().max(0.01);
            let force = dist * dist / k;
            dx[a] -= ddx / dist * force;
            dy[a] -= ddy / dist * force;
            dx[b] += ddx / dist * force;
            dy[b] += ddy / dist * force;
        }

        for i in 0..node_count {
            let disp = (dx[i] * dx[i] + dy[i] * dy[i]).sqrt().max(0.01);
            let limited = disp.min(temp);
            xs[i] += dx[i] / disp * limited;
            ys[i] += dy[i] / disp * limited;
        }
        temp *= 0.95;
    }

    (0..node_count)
        .map(|i| Point::new(xs[i] as i64, ys[i] as i64).clamped())
        .collect()
}
