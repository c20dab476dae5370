use cgmath::{Decomposed, InnerSpace, One, Quaternion as CgQuaternion, Vector3, Zero};
use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;

/////////////////////////////////////////////////////////////////////////////////////////////////

pub type Index = usize;
pub type Quaternion = CgQuaternion<f64>;
pub type Position = Vector3<f64>;
pub type Depth = usize;

/// Rigid transform of a joint (`disp` is the translation, `rot` the rotation, `scale` is always 1).
pub type JointTransform = Decomposed<Position, Quaternion>;

/// Build a [`JointTransform`] from a translation and a rotation.
pub fn joint_transform(disp: Position, rot: Quaternion) -> JointTransform {
    Decomposed {
        scale: 1.0,
        rot,
        disp,
    }
}

pub fn identity_transform() -> JointTransform {
    joint_transform(Position::zero(), Quaternion::one())
}

/////////////////////////////////////////////////////////////////////////////////////////////////

/// One animated degree of freedom of a joint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Xposition,
    Yposition,
    Zposition,
    Xrotation,
    Yrotation,
    Zrotation,
}

impl Channel {
    pub const ALL: [Channel; 6] = [
        Channel::Xposition,
        Channel::Yposition,
        Channel::Zposition,
        Channel::Xrotation,
        Channel::Yrotation,
        Channel::Zrotation,
    ];

    pub fn token(self) -> &'static str {
        match self {
            Channel::Xposition => "Xposition",
            Channel::Yposition => "Yposition",
            Channel::Zposition => "Zposition",
            Channel::Xrotation => "Xrotation",
            Channel::Yrotation => "Yrotation",
            Channel::Zrotation => "Zrotation",
        }
    }

    pub fn is_position(self) -> bool {
        matches!(
            self,
            Channel::Xposition | Channel::Yposition | Channel::Zposition
        )
    }

    pub fn is_rotation(self) -> bool {
        !self.is_position()
    }
}

impl FromStr for Channel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::ALL
            .iter()
            .copied()
            .find(|channel| channel.token() == s)
            .ok_or(())
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Channels of a joint in the order they appear in every motion frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelLayout(pub Vec<Channel>);

impl ChannelLayout {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Channel> + '_ {
        self.0.iter().copied()
    }

    pub fn push(&mut self, channel: Channel) {
        self.0.push(channel);
    }

    pub fn position_count(&self) -> usize {
        self.iter().filter(|c| c.is_position()).count()
    }
}

/////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone)]
pub struct Joint {
    pub name: String,
    pub index: Index,
    /// `None` for the root
    pub parent: Option<Index>,
    pub depth: Depth,
    pub children: Vec<Index>,
    /// Bind pose translation from the parent joint
    pub offset: Position,
    /// Tail of the bone: the End Site offset for leaves, the average child offset otherwise.
    /// Only meaningful for drawing.
    pub end: Position,
    pub end_site: Option<Position>,
    pub channels: ChannelLayout,
}

impl Joint {
    pub(crate) fn new(name: &str, index: Index, parent: Option<Index>, depth: Depth) -> Self {
        Joint {
            name: name.to_string(),
            index,
            parent,
            depth,
            children: Vec::new(),
            offset: Position::zero(),
            end: Position::zero(),
            end_site: None,
            channels: ChannelLayout::default(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn bone_length(&self) -> f64 {
        self.end.magnitude()
    }
}

/// Joint tree stored as a flat array in depth-first pre-order, so every parent comes before its children.
#[derive(Debug, Clone)]
pub struct Skeleton {
    pub joints: Vec<Joint>,
    pub root: Index,
}

impl Skeleton {
    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    pub fn find_joint_by_index(&self, index: Index) -> Option<&Joint> {
        self.joints.get(index)
    }

    pub fn find_joint_by_name(&self, name: &str) -> Option<&Joint> {
        self.joints.iter().find(|joint| joint.name == name)
    }

    /// Number of values in one motion frame.
    pub fn channel_count(&self) -> usize {
        self.joints.iter().map(|joint| joint.channels.len()).sum()
    }

    /// Returns the kinematic chains of the skeleton like \[\[0,1,2,3\],\[4,5,6\],\[7,8\]\].
    /// A new chain starts at every joint that is not the first child of its parent,
    /// which for humanoids gives the legs, arms and spine+head.
    /// Each chain after the first begins with its branching parent so it can be drawn as one line strip.
    pub fn kinematic_chains(&self) -> Vec<Vec<Index>> {
        let mut chains: Vec<Vec<Index>> = Vec::new();
        for joint in &self.joints {
            let continues_chain = match joint.parent {
                Some(parent) => self.joints[parent].children.first() == Some(&joint.index),
                None => false,
            };
            match (continues_chain, chains.last_mut()) {
                (true, Some(chain)) => chain.push(joint.index),
                _ => chains.push(joint.parent.into_iter().chain([joint.index]).collect()),
            }
        }
        chains
    }

    /// World transforms of the bind pose: accumulated offsets, identity rotations.
    pub fn rest_pose(&self) -> Vec<JointTransform> {
        let mut pose: Vec<JointTransform> = Vec::with_capacity(self.joints.len());
        for joint in &self.joints {
            let disp = match joint.parent {
                Some(parent) => pose[parent].disp + joint.offset,
                None => joint.offset,
            };
            pose.push(joint_transform(disp, Quaternion::one()));
        }
        pose
    }
}

/////////////////////////////////////////////////////////////////////////////////////////////////

/// Per joint, per frame local transforms decoded from the MOTION section.
#[derive(Debug, Clone)]
pub struct Motion {
    pub frame_count: usize,
    /// Seconds per frame
    pub frame_time: f64,
    pub fps: u32,
    /// `local[joint][frame]`
    pub local: Vec<Vec<JointTransform>>,
    /// Raw channel values, `values_per_frame` per frame
    pub(crate) values: Vec<f64>,
    pub(crate) values_per_frame: usize,
}

impl Motion {
    /// Raw values of one frame, in the order they appear in the file.
    /// `None` when `frame` is not below `frame_count`.
    pub fn channel_values(&self, frame: usize) -> Option<&[f64]> {
        if frame >= self.frame_count {
            return None;
        }
        let start = frame * self.values_per_frame;
        self.values.get(start..start + self.values_per_frame)
    }

    /// Clip length in seconds.
    pub fn duration(&self) -> f64 {
        self.frame_count as f64 * self.frame_time
    }
}

/// A parsed .bvh file.
#[derive(Debug)]
pub struct Bvh {
    pub skeleton: Skeleton,
    pub motion: Motion,
    /// Recoverable problems met while parsing
    pub warnings: Vec<ParseError>,
}
