use cgmath::{Vector3, Zero};
use log::trace;

use crate::cursor::Cursor;
use crate::error::{ParseError, Result, Section};
use crate::types::*;
use crate::utils::from_euler_zxy;

/// Upper bound on `frame_count * joint count` for one clip (about 1 GiB of transforms).
/// A file with no channels has nothing else limiting its frame count.
pub const MAX_MOTION_TRANSFORMS: usize = 1 << 24;

fn fps_from_frame_time(frame_time: f64) -> u32 {
    if frame_time > 0.0 {
        (1.0 / frame_time).round() as u32
    } else {
        0
    }
}

/// Decode the MOTION section, the cursor being right after the `MOTION` keyword.
///
/// Every frame holds, for each joint in index order, exactly the channels that joint declared,
/// in the declared order. Values may be spread over any number of lines.
pub(crate) fn decode_motion(cursor: &mut Cursor, skeleton: &Skeleton) -> Result<Motion> {
    cursor.skip_whitespace();
    if !cursor.keyword("Frames:") {
        return Err(ParseError::MissingSection(Section::FrameCount));
    }
    let frame_count = cursor
        .read_usize()
        .ok_or(ParseError::MissingSection(Section::FrameCount))?;

    cursor.skip_whitespace();
    if !cursor.keyword("Frame Time:") {
        return Err(ParseError::MissingSection(Section::FrameTime));
    }
    let frame_time = cursor
        .read_f64()
        .ok_or(ParseError::MissingSection(Section::FrameTime))?;

    if frame_count == 0 {
        return Err(ParseError::NoFrames);
    }
    let limit = MAX_MOTION_TRANSFORMS / skeleton.len().max(1);
    if frame_count > limit {
        return Err(ParseError::TooManyFrames {
            frames: frame_count,
            limit,
        });
    }

    let values_per_frame = skeleton.channel_count();
    // a bogus frame count must not turn into a huge allocation; the text bounds the real size
    let text_bound = cursor.rest().len() / 2 + 1;
    let mut values: Vec<f64> =
        Vec::with_capacity(frame_count.saturating_mul(values_per_frame).min(text_bound));
    let mut local: Vec<Vec<JointTransform>> =
        vec![Vec::with_capacity(frame_count.min(text_bound)); skeleton.len()];

    for frame in 0..frame_count {
        for joint in &skeleton.joints {
            if joint.channels.is_empty() {
                local[joint.index].push(identity_transform());
                continue;
            }
            let mut position = Position::zero();
            let mut euler: Vector3<f64> = Vector3::zero();

            for (read, channel) in joint.channels.iter().enumerate() {
                let value = cursor.read_f64().ok_or_else(|| ParseError::TruncatedMotionData {
                    frame,
                    joint: joint.name.clone(),
                    expected: joint.channels.len(),
                    found: read,
                })?;
                values.push(value);
                match channel {
                    Channel::Xposition => position.x = value,
                    Channel::Yposition => position.y = value,
                    Channel::Zposition => position.z = value,
                    Channel::Xrotation => euler.x = value,
                    Channel::Yrotation => euler.y = value,
                    Channel::Zrotation => euler.z = value,
                }
            }

            let rotation = from_euler_zxy(euler.x, euler.y, euler.z);
            local[joint.index].push(joint_transform(position, rotation));
        }
    }
    trace!("decoded {} values over {frame_count} frames", values.len());

    Ok(Motion {
        frame_count,
        frame_time,
        fps: fps_from_frame_time(frame_time),
        local,
        values,
        values_per_frame,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_hierarchy;
    use cgmath::{InnerSpace, One};

    fn decode(hierarchy: &str, motion: &str) -> Result<(Skeleton, Motion)> {
        let mut cursor = Cursor::new(hierarchy);
        let skeleton = parse_hierarchy(&mut cursor, &mut Vec::new())?;
        let mut cursor = Cursor::new(motion);
        let motion = decode_motion(&mut cursor, &skeleton)?;
        Ok((skeleton, motion))
    }

    const SINGLE: &str = "HIERARCHY
ROOT Hips
{
  OFFSET 0 0 0
  CHANNELS 6 Zrotation Xrotation Yrotation Xposition Yposition Zposition
  End Site
  {
    OFFSET 0 1 0
  }
}
";

    #[test]
    fn round_trips_channel_values() {
        let (_, motion) = decode(SINGLE, "Frames: 1\nFrame Time: 0.04\n30 -45 60 1.5 2.5 -3.5\n").unwrap();
        assert_eq!(motion.frame_count, 1);
        assert_eq!(motion.fps, 25);
        assert_eq!(motion.channel_values(0), Some(&[30.0, -45.0, 60.0, 1.5, 2.5, -3.5][..]));

        let local = &motion.local[0][0];
        assert_eq!(local.disp, Position::new(1.5, 2.5, -3.5));
        // Zrotation=30, Xrotation=-45, Yrotation=60
        let expected = from_euler_zxy(-45.0, 60.0, 30.0);
        assert!((local.rot - expected).magnitude() < 1e-12);
    }

    #[test]
    fn joints_without_channels_get_identity() {
        let hierarchy = "HIERARCHY\nROOT Hips\n{\n OFFSET 0 0 0\n JOINT Fixed\n {\n  OFFSET 0 1 0\n }\n}\n";
        let (_, motion) = decode(hierarchy, "Frames: 2\nFrame Time: 0.1\n\n").unwrap();
        assert_eq!(motion.local.len(), 2);
        assert_eq!(motion.local[1].len(), 2);
        assert_eq!(motion.local[1][1].rot, Quaternion::one());
        assert_eq!(motion.local[1][1].disp, Position::zero());
    }

    #[test]
    fn frame_count_is_bounded_without_channels() {
        let hierarchy = "HIERARCHY\nROOT Hips\n{\n OFFSET 0 0 0\n}\n";
        match decode(hierarchy, "Frames: 1000000000000\nFrame Time: 0.1\n") {
            Err(ParseError::TooManyFrames { frames, limit }) => {
                assert_eq!(frames, 1_000_000_000_000);
                assert_eq!(limit, MAX_MOTION_TRANSFORMS);
            }
            other => panic!("unexpected result {other:?}"),
        }

        let (_, motion) = decode(hierarchy, "Frames: 1000\nFrame Time: 0.1\n").unwrap();
        assert_eq!(motion.local[0].len(), 1000);
        assert_eq!(motion.channel_values(999), Some(&[][..]));
    }

    #[test]
    fn huge_frame_count_with_channels_is_truncated() {
        let result = decode(SINGLE, "Frames: 1000000\nFrame Time: 0.1\n0 0 0 0 0 0\n");
        assert!(matches!(
            result,
            Err(ParseError::TruncatedMotionData { frame: 1, found: 0, .. })
        ));
    }

    #[test]
    fn values_may_span_lines() {
        let (_, motion) = decode(SINGLE, "Frames: 2 Frame Time: 0.5\n1 2 3\n4 5 6 7 8\n9 10 11 12\n").unwrap();
        assert_eq!(motion.channel_values(1), Some(&[7.0, 8.0, 9.0, 10.0, 11.0, 12.0][..]));
        assert_eq!(motion.channel_values(2), None);
        assert_eq!(motion.duration(), 1.0);
    }

    #[test]
    fn truncated_frame_fails() {
        let result = decode(SINGLE, "Frames: 2\nFrame Time: 0.04\n0 0 0 0 0 0\n0 0 0\n");
        match result {
            Err(ParseError::TruncatedMotionData {
                frame,
                joint,
                expected,
                found,
            }) => {
                assert_eq!(frame, 1);
                assert_eq!(joint, "Hips");
                assert_eq!(expected, 6);
                assert_eq!(found, 3);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn header_errors() {
        assert!(matches!(
            decode(SINGLE, "Frame Time: 0.04\n"),
            Err(ParseError::MissingSection(Section::FrameCount))
        ));
        assert!(matches!(
            decode(SINGLE, "Frames: 3\n0 0 0 0 0 0\n"),
            Err(ParseError::MissingSection(Section::FrameTime))
        ));
        assert!(matches!(
            decode(SINGLE, "Frames: 0\nFrame Time: 0.04\n"),
            Err(ParseError::NoFrames)
        ));
    }
}
