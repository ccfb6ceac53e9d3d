use geo::Coord;
use rand::{Rng, RngCore};
use tracing::debug;

use super::{MovementPhase, PersonProfile, PersonState};
use crate::config::{MovementStrategy, PersonConfig};
use crate::geometry::{Segment, distance};

/// Weight of the previous speed when picking the next one.
const SPEED_INERTIA: f64 = 0.6;
/// Share of max stamina below which the person slows toward `min_speed`.
const LOW_STAMINA: f64 = 0.3;
/// Held deviation below which a correcting person counts as realigned.
const REALIGNED_ANGLE: f64 = 0.5 * std::f64::consts::PI / 180.0;

/// Ground-truth position of the person after one time step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TruePosition {
    /// Seconds since the walk started.
    pub elapsed: f64,
    pub position: Coord,
    pub heading: f64,
    pub speed: f64,
    pub stamina: f64,
    pub phase: MovementPhase,
}

impl TruePosition {
    pub fn from_state(state: &PersonState) -> Self {
        Self {
            elapsed: state.elapsed,
            position: state.position,
            heading: state.heading,
            speed: state.speed,
            stamina: state.stamina,
            phase: state.phase,
        }
    }
}

/// Advances a person one time step along a segment.
///
/// Takes `&mut dyn RngCore` so models stay object safe and can be picked
/// from configuration at runtime.
pub trait MovementModel: Send + Sync {
    fn profile(&self) -> &PersonProfile;

    fn step(&self, state: &mut PersonState, segment: &Segment, dt: f64, rng: &mut dyn RngCore);
}

/// Selects the movement model named by `person.movement_strategy`.
pub fn movement_model(profile: PersonProfile, config: &PersonConfig) -> Box<dyn MovementModel> {
    match config.movement_strategy {
        MovementStrategy::Realistic => Box::new(RealisticMovement {
            profile,
            correction_threshold: config.correction_threshold,
            correction_factor: config.correction_factor,
        }),
        MovementStrategy::Simple => Box::new(SimpleMovement { profile }),
    }
}

/// Stamina, random deviation and edge correction.
#[derive(Debug, Clone)]
pub struct RealisticMovement {
    pub profile: PersonProfile,
    /// Meters off the edge before the person steers back.
    pub correction_threshold: f64,
    pub correction_factor: f64,
}

impl RealisticMovement {
    fn rest(&self, state: &mut PersonState, dt: f64) {
        let p = &self.profile;
        state.speed = 0.0;
        state.stamina = (state.stamina + p.stamina_recovery_rate * dt).min(p.max_stamina);
    }

    fn update_phase(&self, state: &mut PersonState, segment: &Segment, rng: &mut dyn RngCore) {
        let p = &self.profile;
        let lateral = segment.lateral(state.position).abs();

        match state.phase {
            MovementPhase::Correcting => {
                state.deviation *= 1.0 - self.correction_factor;
                if state.deviation.abs() < REALIGNED_ANGLE
                    && lateral <= self.correction_threshold / 2.0
                {
                    state.phase = MovementPhase::Walking;
                }
            }
            _ if lateral > self.correction_threshold => {
                state.phase = MovementPhase::Correcting;
                state.deviation *= 1.0 - self.correction_factor;
            }
            _ => {
                if p.max_deviation_angle > 0.0 && rng.r#gen::<f64>() < p.deviation_probability {
                    state.deviation =
                        rng.gen_range(-p.max_deviation_angle..=p.max_deviation_angle);
                    state.phase = MovementPhase::Deviating;
                }
            }
        }
    }

    fn next_speed(&self, state: &PersonState, rng: &mut dyn RngCore) -> f64 {
        let p = &self.profile;
        let target = rng.gen_range(p.min_speed..=p.max_speed);
        let previous = state.speed.clamp(p.min_speed, p.max_speed);
        let mut speed = SPEED_INERTIA * previous + (1.0 - SPEED_INERTIA) * target;

        let reserve = state.stamina / p.max_stamina;
        if reserve < LOW_STAMINA {
            speed = p.min_speed + (speed - p.min_speed) * (reserve / LOW_STAMINA);
        }
        speed.clamp(p.min_speed, p.max_speed)
    }
}

impl MovementModel for RealisticMovement {
    fn profile(&self) -> &PersonProfile {
        &self.profile
    }

    fn step(&self, state: &mut PersonState, segment: &Segment, dt: f64, rng: &mut dyn RngCore) {
        let p = &self.profile;
        state.elapsed += dt;

        if state.is_resting() {
            if state.stamina < p.min_stamina_to_walk {
                self.rest(state, dt);
                return;
            }
            state.phase = MovementPhase::Walking;
            state.deviation = 0.0;
        }

        self.update_phase(state, segment, rng);

        let aim = if state.phase == MovementPhase::Correcting {
            // Rejoin the edge a little ahead instead of walking at it square-on
            let lookahead = (2.0 * self.correction_threshold).max(state.speed * dt);
            segment.point_at(segment.progress(state.position) + lookahead)
        } else {
            segment.end
        };
        let to_aim = aim - state.position;
        state.heading = to_aim.y.atan2(to_aim.x) + state.deviation;
        state.speed = self.next_speed(state, rng);

        let walked = state.speed * dt;
        state.position.x += walked * state.heading.cos();
        state.position.y += walked * state.heading.sin();

        state.stamina -= p.stamina_cost(walked, state.speed);
        if state.stamina < p.min_stamina_to_walk {
            state.stamina += p.stamina_recovery_rate * p.walking_recovery_factor * dt;
        }
        state.stamina = state.stamina.clamp(0.0, p.max_stamina);
        if state.stamina <= 0.0 {
            state.phase = MovementPhase::Resting;
        }
    }
}

/// Straight walking toward the segment end at a uniform random speed.
#[derive(Debug, Clone)]
pub struct SimpleMovement {
    pub profile: PersonProfile,
}

impl MovementModel for SimpleMovement {
    fn profile(&self) -> &PersonProfile {
        &self.profile
    }

    fn step(&self, state: &mut PersonState, segment: &Segment, dt: f64, rng: &mut dyn RngCore) {
        let p = &self.profile;
        let to_end = segment.end - state.position;
        state.heading = to_end.y.atan2(to_end.x);
        state.speed = rng.gen_range(p.min_speed..=p.max_speed);
        // Never overshoot the corner
        let walked = (state.speed * dt).min(distance(state.position, segment.end));
        state.position.x += walked * state.heading.cos();
        state.position.y += walked * state.heading.sin();
        state.elapsed += dt;
    }
}

/// Result of walking one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentWalk {
    pub steps: usize,
    /// The step ceiling ended the segment before it was walked.
    pub forced: bool,
}

/// Walks `segment` until it is complete, appending one position per step.
///
/// A segment is complete once the projected progress is within `tolerance`
/// of its end, or, when `closing` is given, once the person is within the
/// closing distance of the ring start.
#[allow(clippy::too_many_arguments)]
pub fn walk_segment(
    model: &dyn MovementModel,
    state: &mut PersonState,
    segment: &Segment,
    dt: f64,
    tolerance: f64,
    closing: Option<(Coord, f64)>,
    rng: &mut dyn RngCore,
    track: &mut Vec<TruePosition>,
) -> SegmentWalk {
    let ceiling = step_ceiling(model.profile(), segment, dt);
    let mut steps = 0;

    loop {
        if segment.length - segment.progress(state.position) <= tolerance {
            return SegmentWalk { steps, forced: false };
        }
        if closing.is_some_and(|(target, radius)| distance(state.position, target) <= radius) {
            return SegmentWalk { steps, forced: false };
        }
        if steps >= ceiling {
            debug!(
                segment = segment.index,
                steps, "Segment stalled, forcing completion"
            );
            return SegmentWalk { steps, forced: true };
        }

        model.step(state, segment, dt, rng);
        track.push(TruePosition::from_state(state));
        steps += 1;
    }
}

/// Upper bound on steps for one segment: ten times the slowest walk, plus one
/// full recovery and some slack.
fn step_ceiling(profile: &PersonProfile, segment: &Segment, dt: f64) -> usize {
    let walking = (segment.length / (profile.min_speed * dt)).ceil();
    let recovery = (profile.max_stamina / (profile.stamina_recovery_rate * dt)).ceil();
    let ceiling = 10.0 * (walking + recovery) + 100.0;
    if ceiling.is_finite() {
        ceiling as usize
    } else {
        usize::MAX
    }
}
