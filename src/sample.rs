//! World space poses of a parsed clip at arbitrary (fractional) frame positions, and the playback
//! state of one playing clip.

use cgmath::{Rotation, VectorSpace};

use crate::types::*;

/// Local transform of `joint` at fractional frame `frame`.
///
/// Past the last frame the last frame is held; wrapping for loops is up to the caller.
pub fn local_transform(motion: &Motion, joint: Index, frame: f64) -> JointTransform {
    let frames = &motion.local[joint];
    let last = motion.frame_count - 1;
    let frame = frame.max(0.0);
    let i = frame.floor() as usize;
    if i >= last {
        return frames[last];
    }

    let t = frame - i as f64;
    if t == 0.0 {
        return frames[i];
    }
    let (a, b) = (&frames[i], &frames[i + 1]);
    joint_transform(a.disp.lerp(b.disp, t), a.rot.slerp(b.rot, t))
}

/// Same as [`sample`], writing into `pose` so the buffer can be reused from tick to tick.
///
/// Joints are visited in index order, which is parent-before-child. A non-root joint is placed at
/// its static bind `offset` from the parent; only the root uses its animated translation.
pub fn sample_into(skeleton: &Skeleton, motion: &Motion, frame: f64, pose: &mut Vec<JointTransform>) {
    pose.clear();
    for joint in &skeleton.joints {
        let local = local_transform(motion, joint.index, frame);
        let world = match joint.parent {
            None => local,
            Some(parent) => {
                let parent = &pose[parent];
                joint_transform(
                    parent.disp + parent.rot.rotate_vector(joint.offset),
                    parent.rot * local.rot,
                )
            }
        };
        pose.push(world);
    }
}

/// World transform of every joint at fractional frame `frame` (`frame_count` must be non-zero).
pub fn sample(skeleton: &Skeleton, motion: &Motion, frame: f64) -> Vec<JointTransform> {
    let mut pose = Vec::with_capacity(skeleton.len());
    sample_into(skeleton, motion, frame, &mut pose);
    pose
}

/////////////////////////////////////////////////////////////////////////////////////////////////

/// Playback of one clip: looping frame position, pause flag and the cached pose of the current frame.
#[derive(Debug, Clone)]
pub struct AnimationState {
    frame: f64,
    paused: bool,
    pose: Vec<JointTransform>,
    dirty: bool,
}

impl Default for AnimationState {
    fn default() -> Self {
        Self::new()
    }
}

impl AnimationState {
    pub fn new() -> Self {
        AnimationState {
            frame: 0.0,
            paused: false,
            pose: Vec::new(),
            dirty: true,
        }
    }

    pub fn frame(&self) -> f64 {
        self.frame
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    /// Jump to a frame position, wrapped into the clip.
    pub fn set_frame(&mut self, bvh: &Bvh, frame: f64) {
        self.frame = frame.rem_euclid(bvh.motion.frame_count as f64);
        self.dirty = true;
    }

    /// Advance by `elapsed` seconds of clock time, looping back to the first frame at the end.
    pub fn update(&mut self, bvh: &Bvh, elapsed: f64) {
        if self.paused || bvh.motion.frame_time <= 0.0 {
            return;
        }
        self.set_frame(bvh, self.frame + elapsed / bvh.motion.frame_time);
    }

    /// Move by whole frames (negative goes back), wrapping like [`update`](Self::update).
    pub fn step(&mut self, bvh: &Bvh, frames: i64) {
        self.set_frame(bvh, self.frame.floor() + frames as f64);
    }

    /// World transforms for the current frame, recomputed only when the frame changed.
    pub fn world_transforms(&mut self, bvh: &Bvh) -> &[JointTransform] {
        if self.dirty || self.pose.len() != bvh.skeleton.len() {
            sample_into(&bvh.skeleton, &bvh.motion, self.frame, &mut self.pose);
            self.dirty = false;
        }
        &self.pose
    }
}
