//! Skeleton overlay drawing.

use gait_models::{Landmark, LandmarkSet};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};

/// Bone segments of the 33-landmark body topology.
pub const POSE_CONNECTIONS: [(usize, usize); 35] = [
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 7),
    (0, 4),
    (4, 5),
    (5, 6),
    (6, 8),
    (9, 10),
    (11, 12),
    (11, 13),
    (13, 15),
    (15, 17),
    (15, 19),
    (15, 21),
    (17, 19),
    (12, 14),
    (14, 16),
    (16, 18),
    (16, 20),
    (16, 22),
    (18, 20),
    (11, 23),
    (12, 24),
    (23, 24),
    (23, 25),
    (24, 26),
    (25, 27),
    (26, 28),
    (27, 29),
    (28, 30),
    (29, 31),
    (30, 32),
    (27, 31),
    (28, 32),
];

const BONE: Rgb<u8> = Rgb([255, 255, 255]);
const CONFIDENT: Rgb<u8> = Rgb([0, 220, 0]);
const UNCERTAIN: Rgb<u8> = Rgb([255, 170, 0]);
const INTERPOLATED: Rgb<u8> = Rgb([40, 120, 255]);

/// Landmarks below this are not drawn at all.
const MIN_DRAW_VISIBILITY: f64 = 0.1;
const CONFIDENT_VISIBILITY: f64 = 0.5;
const JOINT_RADIUS: i32 = 2;

/// Draw the skeleton for `landmarks` onto `frame` in place.
pub fn draw_skeleton(frame: &mut RgbImage, landmarks: &LandmarkSet) {
    let (width, height) = frame.dimensions();
    if width == 0 || height == 0 {
        return;
    }
    let to_px = |lm: &Landmark| {
        (
            (lm.x * f64::from(width - 1)).round() as f32,
            (lm.y * f64::from(height - 1)).round() as f32,
        )
    };

    for (a, b) in POSE_CONNECTIONS {
        let (la, lb) = (landmarks.get(a), landmarks.get(b));
        if drawable(la) && drawable(lb) {
            draw_line_segment_mut(frame, to_px(la), to_px(lb), BONE);
        }
    }

    for lm in landmarks.iter().filter(|lm| drawable(lm)) {
        let color = if lm.interpolated {
            INTERPOLATED
        } else if lm.visibility >= CONFIDENT_VISIBILITY {
            CONFIDENT
        } else {
            UNCERTAIN
        };
        let (cx, cy) = to_px(lm);
        draw_filled_circle_mut(frame, (cx as i32, cy as i32), JOINT_RADIUS, color);
    }
}

fn drawable(lm: &Landmark) -> bool {
    lm.interpolated || lm.visibility >= MIN_DRAW_VISIBILITY
}

#[cfg(test)]
mod tests {
    use super::*;
    use gait_models::landmark_ids::{LEFT_HIP, LEFT_KNEE};
    use gait_models::LANDMARK_COUNT;

    #[test]
    fn test_undetected_draws_nothing() {
        let mut frame = RgbImage::new(32, 32);
        draw_skeleton(&mut frame, &LandmarkSet::undetected());
        assert!(frame.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }

    #[test]
    fn test_joint_colours() {
        let mut lms: Vec<Landmark> = (0..LANDMARK_COUNT)
            .map(|id| Landmark::new(id as u8, 0.0, 0.0, 0.0, 0.0))
            .collect();
        lms[LEFT_HIP] = Landmark::new(LEFT_HIP as u8, 0.25, 0.5, 0.0, 0.9);
        lms[LEFT_KNEE] = Landmark::new(LEFT_KNEE as u8, 0.75, 0.5, 0.0, 0.3);
        let set = LandmarkSet::new(lms).unwrap();

        let mut frame = RgbImage::new(41, 41);
        draw_skeleton(&mut frame, &set);
        assert_eq!(*frame.get_pixel(10, 20), CONFIDENT);
        assert_eq!(*frame.get_pixel(30, 20), UNCERTAIN);
        // Bone between them
        assert_eq!(*frame.get_pixel(20, 20), BONE);
        // Hidden joints are skipped
        assert_eq!(*frame.get_pixel(0, 0), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_landmarks_on_the_border_are_clipped() {
        let mut set = LandmarkSet::undetected();
        for (id, x) in [(LEFT_HIP, 0.0), (LEFT_KNEE, 1.0)] {
            let lm = set.get_mut(id);
            lm.x = x;
            lm.y = 1.0;
            lm.visibility = 0.9;
        }

        let mut frame = RgbImage::new(16, 16);
        draw_skeleton(&mut frame, &set);
        assert_eq!(*frame.get_pixel(0, 15), CONFIDENT);
        assert_eq!(*frame.get_pixel(15, 15), CONFIDENT);
        assert_eq!(*frame.get_pixel(0, 0), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_interpolated_colour() {
        let mut set = LandmarkSet::undetected();
        let knee = set.get_mut(LEFT_KNEE);
        knee.x = 0.5;
        knee.y = 0.5;
        knee.visibility = 0.5;
        knee.interpolated = true;

        let mut frame = RgbImage::new(21, 21);
        draw_skeleton(&mut frame, &set);
        assert_eq!(*frame.get_pixel(10, 10), INTERPOLATED);
    }
}
