//! Minimal Pong physics: paddles, ball, scoring and the force push.
//!
//! Ball coordinates are its centre; paddle coordinates are the top-left
//! corner. All functions are pure over the shared state types so the same
//! inputs always produce the same step.

use shared::{BallState, PaddleState, PlayerId, HOST_PLAYER_ID, REMOTE_PLAYER_ID};

pub const FIELD_WIDTH: f32 = 800.0;
pub const FIELD_HEIGHT: f32 = 600.0;

pub const PADDLE_WIDTH: f32 = 15.0;
pub const PADDLE_HEIGHT: f32 = 100.0;
pub const LEFT_PADDLE_X: f32 = 30.0;
pub const RIGHT_PADDLE_X: f32 = 755.0;
pub const PADDLE_SPEED: f32 = 400.0;

pub const BALL_SIZE: f32 = 15.0;
pub const SERVE_SPEED: f32 = 300.0;
pub const HIT_SPEEDUP: f32 = 1.05;
pub const MAX_BALL_SPEED: f32 = 900.0;
/// Seconds the ball is held at the centre after a point.
pub const SERVE_DELAY: f32 = 1.0;

/// Meter gained per second.
pub const FORCE_CHARGE_RATE: f32 = 0.2;
/// Maximum distance between paddle centre and ball centre for a push.
pub const FORCE_RANGE: f32 = 150.0;
pub const FORCE_MULTIPLIER: f32 = 1.5;
pub const FORCE_COOLDOWN: f32 = 2.0;

const SERVE_ANGLE: f32 = 0.35;
/// Share of the paddle's vertical speed passed on to the ball on a hit.
const PADDLE_SPIN: f32 = 0.2;

fn paddle_index(player_id: PlayerId) -> usize {
    if player_id == HOST_PLAYER_ID {
        0
    } else {
        1
    }
}

pub fn initial_paddles() -> [PaddleState; 2] {
    let paddle = |x| PaddleState {
        x,
        y: (FIELD_HEIGHT - PADDLE_HEIGHT) / 2.0,
        vel_y: 0.0,
        force_meter: 0.0,
        force_ready: false,
        force_cooldown: 0.0,
    };
    [paddle(LEFT_PADDLE_X), paddle(RIGHT_PADDLE_X)]
}

/// Ball parked at the centre, not moving.
pub fn centred_ball() -> BallState {
    BallState {
        x: FIELD_WIDTH / 2.0,
        y: FIELD_HEIGHT / 2.0,
        vel_x: 0.0,
        vel_y: 0.0,
    }
}

/// Launches a centred ball toward `receiver`.
pub fn serve_toward(receiver: PlayerId) -> BallState {
    let direction = if receiver == HOST_PLAYER_ID { -1.0 } else { 1.0 };
    BallState {
        vel_x: direction * SERVE_SPEED,
        vel_y: SERVE_SPEED * SERVE_ANGLE,
        ..centred_ball()
    }
}

pub fn ball_speed(ball: &BallState) -> f32 {
    (ball.vel_x * ball.vel_x + ball.vel_y * ball.vel_y).sqrt()
}

fn scale_capped(ball: &mut BallState, factor: f32) {
    let speed = ball_speed(ball);
    if speed <= f32::EPSILON {
        return;
    }
    let target = (speed * factor).min(MAX_BALL_SPEED);
    let k = target / speed;
    ball.vel_x *= k;
    ball.vel_y *= k;
}

/// Moves a paddle in `direction` (-1 up, 0 stop, 1 down), clamped to the field.
pub fn move_paddle(paddle: &mut PaddleState, direction: f32, dt: f32) {
    paddle.vel_y = direction.clamp(-1.0, 1.0) * PADDLE_SPEED;
    paddle.y = (paddle.y + paddle.vel_y * dt).clamp(0.0, FIELD_HEIGHT - PADDLE_HEIGHT);
}

/// Runs down the cooldown, then charges the meter.
pub fn charge_force(paddle: &mut PaddleState, dt: f32) {
    if paddle.force_cooldown > 0.0 {
        paddle.force_cooldown = (paddle.force_cooldown - dt).max(0.0);
    } else {
        paddle.force_meter = (paddle.force_meter + FORCE_CHARGE_RATE * dt).min(1.0);
    }
    paddle.force_ready = paddle.force_meter >= 1.0 && paddle.force_cooldown <= 0.0;
}

/// Attempts a force push by `player_id`. Returns whether it fired.
pub fn try_force_push(paddles: &mut [PaddleState; 2], player_id: PlayerId, ball: &mut BallState) -> bool {
    let paddle = &mut paddles[paddle_index(player_id)];
    if !paddle.force_ready {
        return false;
    }

    let cx = paddle.x + PADDLE_WIDTH / 2.0;
    let cy = paddle.y + PADDLE_HEIGHT / 2.0;
    let distance = ((ball.x - cx).powi(2) + (ball.y - cy).powi(2)).sqrt();
    if distance > FORCE_RANGE {
        return false;
    }

    let away = if player_id == HOST_PLAYER_ID { 1.0 } else { -1.0 };
    ball.vel_x = away * ball.vel_x.abs().max(SERVE_SPEED * 0.5);
    scale_capped(ball, FORCE_MULTIPLIER);

    paddle.force_meter = 0.0;
    paddle.force_ready = false;
    paddle.force_cooldown = FORCE_COOLDOWN;
    true
}

fn overlaps_vertically(ball: &BallState, paddle: &PaddleState) -> bool {
    let half = BALL_SIZE / 2.0;
    ball.y + half >= paddle.y && ball.y - half <= paddle.y + PADDLE_HEIGHT
}

fn bounce_off(ball: &mut BallState, paddle: &PaddleState, direction: f32) {
    ball.vel_x = direction * ball.vel_x.abs();
    ball.vel_y += paddle.vel_y * PADDLE_SPIN;
    scale_capped(ball, HIT_SPEEDUP);
}

/// Advances the ball by `dt`. Returns the player who scored, if any.
///
/// Paddle hits are checked against the paddle face crossed during the step,
/// so a fast ball cannot pass through.
pub fn step_ball(ball: &mut BallState, paddles: &[PaddleState; 2], dt: f32) -> Option<PlayerId> {
    let half = BALL_SIZE / 2.0;
    let prev_x = ball.x;

    ball.x += ball.vel_x * dt;
    ball.y += ball.vel_y * dt;

    if ball.y - half < 0.0 {
        ball.y = half;
        ball.vel_y = ball.vel_y.abs();
    } else if ball.y + half > FIELD_HEIGHT {
        ball.y = FIELD_HEIGHT - half;
        ball.vel_y = -ball.vel_y.abs();
    }

    let left = &paddles[0];
    let left_face = left.x + PADDLE_WIDTH;
    if ball.vel_x < 0.0
        && prev_x - half >= left_face
        && ball.x - half <= left_face
        && overlaps_vertically(ball, left)
    {
        ball.x = left_face + half;
        bounce_off(ball, left, 1.0);
    }

    let right = &paddles[1];
    let right_face = right.x;
    if ball.vel_x > 0.0
        && prev_x + half <= right_face
        && ball.x + half >= right_face
        && overlaps_vertically(ball, right)
    {
        ball.x = right_face - half;
        bounce_off(ball, right, -1.0);
    }

    if ball.x + half < 0.0 {
        Some(REMOTE_PLAYER_ID)
    } else if ball.x - half > FIELD_WIDTH {
        Some(HOST_PLAYER_ID)
    } else {
        None
    }
}
