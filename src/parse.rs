use cgmath::Zero;
use log::{debug, warn};
use std::path::Path;

use crate::cursor::Cursor;
use crate::error::{ParseError, Result, Section};
use crate::motion::decode_motion;
use crate::types::*;

///////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

fn malformed(cursor: &Cursor, reason: String) -> ParseError {
    ParseError::MalformedHierarchy {
        line: cursor.line(),
        reason,
    }
}

fn read_vector(cursor: &mut Cursor) -> Option<Position> {
    let x = cursor.read_f64()?;
    let y = cursor.read_f64()?;
    let z = cursor.read_f64()?;
    Some(Position::new(x, y, z))
}

/// Read the channel tokens following a `CHANNELS <count>` keyword. The list never runs past the end of
/// its line. An unknown token ends the list: the channels read so far are kept and the rest of the line
/// is dropped.
fn read_channels(
    cursor: &mut Cursor,
    joint_name: &str,
    warnings: &mut Vec<ParseError>,
) -> Result<ChannelLayout> {
    let count = cursor
        .read_usize()
        .ok_or_else(|| malformed(cursor, format!("CHANNELS of joint '{joint_name}' needs a count")))?;

    let mut layout = ChannelLayout::default();
    for _ in 0..count {
        cursor.skip_spaces();
        if cursor.at_line_end() {
            warn!(
                "line {}: joint '{joint_name}' declares {count} channels but lists {}",
                cursor.line(),
                layout.len()
            );
            break;
        }
        let token = cursor.peek_token();
        match token.parse::<Channel>() {
            Ok(channel) => {
                cursor.keyword(token);
                layout.push(channel);
            }
            Err(()) => {
                let error = ParseError::UnknownChannelToken {
                    joint: joint_name.to_string(),
                    line: cursor.line(),
                    token: token.to_string(),
                };
                warn!("{error}");
                warnings.push(error);
                cursor.next_line();
                break;
            }
        }
    }
    Ok(layout)
}

/// Parse the `{ OFFSET x y z }` block after an `End Site` keyword.
fn parse_end_site(cursor: &mut Cursor, joint_name: &str) -> Result<Position> {
    cursor.skip_whitespace();
    if !cursor.keyword("{") {
        return Err(malformed(cursor, format!("expected '{{' after End Site of joint '{joint_name}'")));
    }

    let mut end = Position::zero();
    loop {
        cursor.skip_whitespace();
        if cursor.is_eof() {
            return Err(malformed(cursor, format!("unexpected end of file in End Site of joint '{joint_name}'")));
        }
        if cursor.keyword("}") {
            return Ok(end);
        } else if cursor.keyword("OFFSET") {
            end = read_vector(cursor).ok_or_else(|| {
                malformed(cursor, format!("End Site OFFSET of joint '{joint_name}' needs three numbers"))
            })?;
        } else {
            cursor.next_line();
        }
    }
}

/// Deepest joint nesting accepted; the root is at depth 0.
pub const MAX_JOINT_DEPTH: Depth = 256;

/// Parse one joint block, the cursor being right after its `ROOT` or `JOINT` keyword.
/// The joint and all its descendants are appended to `joints` in depth-first pre-order.
fn parse_joint(
    cursor: &mut Cursor,
    joints: &mut Vec<Joint>,
    warnings: &mut Vec<ParseError>,
    parent: Option<Index>,
    depth: Depth,
) -> Result<Index> {
    if depth > MAX_JOINT_DEPTH {
        return Err(malformed(cursor, format!("joints nested deeper than {MAX_JOINT_DEPTH} levels")));
    }
    let name = cursor.read_identifier();
    cursor.skip_whitespace();
    if !cursor.keyword("{") {
        return Err(malformed(cursor, format!("expected '{{' after joint '{name}'")));
    }

    let index = joints.len();
    joints.push(Joint::new(name, index, parent, depth));

    let mut children_offsets = Position::zero();
    let mut child_count = 0;

    loop {
        cursor.skip_whitespace();
        if cursor.is_eof() {
            return Err(malformed(cursor, format!("unexpected end of file in joint '{name}'")));
        }

        if cursor.keyword("OFFSET") {
            joints[index].offset = read_vector(cursor).ok_or_else(|| {
                malformed(cursor, format!("OFFSET of joint '{name}' needs three numbers"))
            })?;
        } else if cursor.keyword("CHANNELS") {
            joints[index].channels = read_channels(cursor, name, warnings)?;
        } else if cursor.keyword("JOINT") {
            let child = parse_joint(cursor, joints, warnings, Some(index), depth + 1)?;
            joints[index].children.push(child);
            children_offsets += joints[child].offset;
            child_count += 1;
        } else if cursor.keyword("End Site") {
            joints[index].end_site = Some(parse_end_site(cursor, name)?);
        } else if cursor.keyword("}") {
            let joint = &mut joints[index];
            joint.end = match joint.end_site {
                Some(end) => end,
                None if child_count > 0 => children_offsets / child_count as f64,
                None => Position::zero(),
            };
            return Ok(index);
        } else {
            debug!(
                "line {}: skipping unknown keyword '{}' in joint '{name}'",
                cursor.line(),
                cursor.peek_token()
            );
            cursor.next_line();
        }
    }
}

///////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

/// Parse the skeleton part of a file, leaving the cursor after the root joint's closing brace.
pub(crate) fn parse_hierarchy(cursor: &mut Cursor, warnings: &mut Vec<ParseError>) -> Result<Skeleton> {
    cursor.skip_whitespace();
    if !cursor.keyword("HIERARCHY") {
        return Err(ParseError::MissingSection(Section::Hierarchy));
    }
    cursor.skip_whitespace();
    if !cursor.keyword("ROOT") {
        return Err(ParseError::MissingSection(Section::Root));
    }

    let mut joints: Vec<Joint> = Vec::new();
    let root = parse_joint(cursor, &mut joints, warnings, None, 0)?;
    Ok(Skeleton { joints, root })
}

/// Parse a whole .bvh file held in memory. Invalid UTF-8 is replaced, not rejected.
pub fn parse(bytes: &[u8]) -> Result<Bvh> {
    let text = String::from_utf8_lossy(bytes);
    parse_str(&text)
}

pub fn parse_str(text: &str) -> Result<Bvh> {
    let mut cursor = Cursor::new(text.strip_prefix('\u{feff}').unwrap_or(text));
    let mut warnings = Vec::new();

    let skeleton = parse_hierarchy(&mut cursor, &mut warnings)?;

    cursor.skip_whitespace();
    if !cursor.keyword("MOTION") {
        return Err(ParseError::MissingSection(Section::Motion));
    }
    let motion = decode_motion(&mut cursor, &skeleton)?;

    debug!(
        "parsed {} joints, {} frames at {} fps",
        skeleton.len(),
        motion.frame_count,
        motion.fps
    );

    Ok(Bvh {
        skeleton,
        motion,
        warnings,
    })
}

//////////////////////////////////////////////////////////////// PUBLIC ///////////////////////////////////////////////////////////////////////////////////

/// load a bvh file from a file path
pub fn load_bvh_from_file(file_path: impl AsRef<Path>) -> Result<Bvh> {
    let bytes = std::fs::read(file_path)?;
    parse(&bytes)
}

/// load a bvh file from a string
pub fn load_bvh_from_string(bvh_string: &str) -> Result<Bvh> {
    parse_str(bvh_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn hierarchy(text: &str) -> (Result<Skeleton>, Vec<ParseError>) {
        let mut cursor = Cursor::new(text);
        let mut warnings = Vec::new();
        let skeleton = parse_hierarchy(&mut cursor, &mut warnings);
        (skeleton, warnings)
    }

    const ARM: &str = "HIERARCHY
ROOT Hips
{
  OFFSET 0.0 90.0 0.0
  CHANNELS 6 Xposition Yposition Zposition Zrotation Xrotation Yrotation
  JOINT LeftUpLeg
  {
    OFFSET 10 0 0
    CHANNELS 3 Zrotation Xrotation Yrotation
    End Site
    {
      OFFSET 0 -40 0
    }
  }
  JOINT RightUpLeg
  {
    OFFSET -10 0 0
    CHANNELS 3 Zrotation Xrotation Yrotation
    JOINT RightLeg
    {
      OFFSET 0 -40 0
      CHANNELS 3 Zrotation Xrotation Yrotation
      End Site
      {
        OFFSET 0 -40 2
      }
    }
  }
}
";

    #[test]
    fn joints_in_pre_order() {
        let (skeleton, warnings) = hierarchy(ARM);
        let skeleton = skeleton.unwrap();
        assert!(warnings.is_empty());

        let names: Vec<&str> = skeleton.joints.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, vec!["Hips", "LeftUpLeg", "RightUpLeg", "RightLeg"]);
        let parents: Vec<Option<Index>> = skeleton.joints.iter().map(|j| j.parent).collect();
        assert_eq!(parents, vec![None, Some(0), Some(0), Some(2)]);
        assert_eq!(skeleton.joints[0].children, vec![1, 2]);
        assert_eq!(skeleton.joints[3].depth, 2);
        assert_eq!(skeleton.channel_count(), 15);
    }

    #[test]
    fn offsets_and_ends() {
        let (skeleton, _) = hierarchy(ARM);
        let skeleton = skeleton.unwrap();
        let hips = &skeleton.joints[0];
        assert_eq!(hips.offset, Position::new(0.0, 90.0, 0.0));
        // average of the two children offsets
        assert_eq!(hips.end, Position::new(0.0, 0.0, 0.0));
        assert_eq!(hips.end_site, None);

        let right_up_leg = &skeleton.joints[2];
        assert_eq!(right_up_leg.end, Position::new(0.0, -40.0, 0.0));

        let right_leg = &skeleton.joints[3];
        assert_eq!(right_leg.end_site, Some(Position::new(0.0, -40.0, 2.0)));
        assert_eq!(right_leg.end, Position::new(0.0, -40.0, 2.0));
        assert!(right_leg.is_leaf());
    }

    #[test]
    fn channel_layout_keeps_declared_order() {
        let (skeleton, _) = hierarchy(ARM);
        let skeleton = skeleton.unwrap();
        assert_eq!(
            skeleton.joints[0].channels.0,
            vec![
                Channel::Xposition,
                Channel::Yposition,
                Channel::Zposition,
                Channel::Zrotation,
                Channel::Xrotation,
                Channel::Yrotation,
            ]
        );
        assert_eq!(skeleton.joints[0].channels.position_count(), 3);
    }

    #[test]
    fn unknown_channel_is_recovered() {
        let text = "HIERARCHY
ROOT Hips
{
  OFFSET 0 0 0
  CHANNELS 3 Zrotation Wrotation Yrotation
  JOINT Spine
  {
    OFFSET 0 1 0
    CHANNELS 3 Zrotation Xrotation Yrotation
    End Site
    {
      OFFSET 0 1 0
    }
  }
}
";
        let (skeleton, warnings) = hierarchy(text);
        let skeleton = skeleton.unwrap();
        assert_eq!(skeleton.len(), 2);
        assert_eq!(skeleton.joints[0].channels.0, vec![Channel::Zrotation]);
        assert_eq!(skeleton.joints[1].channels.len(), 3);
        assert_eq!(warnings.len(), 1);
        match &warnings[0] {
            ParseError::UnknownChannelToken { joint, line, token } => {
                assert_eq!(joint, "Hips");
                assert_eq!(*line, 5);
                assert_eq!(token, "Wrotation");
            }
            other => panic!("unexpected warning {other:?}"),
        }
        assert!(warnings[0].is_recoverable());
    }

    #[test]
    fn short_channel_list_stops_at_line_end() {
        let text = "HIERARCHY
ROOT Hips
{
  OFFSET 0 0 0
  CHANNELS 4 Zrotation Xrotation Yrotation
  JOINT Spine
  {
    OFFSET 0 1 0
    CHANNELS 3 Zrotation Xrotation Yrotation
  }
}
";
        let (skeleton, warnings) = hierarchy(text);
        let skeleton = skeleton.unwrap();
        assert!(warnings.is_empty());
        assert_eq!(skeleton.len(), 2);
        assert_eq!(skeleton.joints[0].channels.len(), 3);
        assert_eq!(skeleton.joints[1].parent, Some(0));
        assert_eq!(skeleton.joints[1].offset, Position::new(0.0, 1.0, 0.0));
        assert_eq!(skeleton.joints[1].channels.len(), 3);
    }

    fn nested(depth: usize) -> String {
        let mut text = String::from("HIERARCHY\nROOT J\n{\n");
        for _ in 0..depth {
            text += "JOINT J\n{\n";
        }
        for _ in 0..=depth {
            text += "}\n";
        }
        text
    }

    #[test]
    fn nesting_depth_is_limited() {
        let (skeleton, _) = hierarchy(&nested(MAX_JOINT_DEPTH));
        let skeleton = skeleton.unwrap();
        assert_eq!(skeleton.len(), MAX_JOINT_DEPTH + 1);
        assert_eq!(skeleton.joints[MAX_JOINT_DEPTH].depth, MAX_JOINT_DEPTH);

        let (skeleton, _) = hierarchy(&nested(100_000));
        assert!(matches!(skeleton, Err(ParseError::MalformedHierarchy { .. })));
    }

    #[test]
    fn unknown_keywords_are_skipped() {
        let text = "HIERARCHY ROOT Hips { OFFSET 1 2 3\n  SCALE 1 1 1\n CHANNELS 3 Xrotation Yrotation Zrotation\n}";
        let (skeleton, _) = hierarchy(text);
        let skeleton = skeleton.unwrap();
        assert_eq!(skeleton.joints[0].offset, Position::new(1.0, 2.0, 3.0));
        assert_eq!(skeleton.joints[0].channels.len(), 3);
    }

    #[test]
    fn anonymous_joint() {
        let (skeleton, _) = hierarchy("HIERARCHY\nROOT\n{\n OFFSET 0 0 0\n}\n");
        let skeleton = skeleton.unwrap();
        assert_eq!(skeleton.joints[0].name, "");
    }

    #[test]
    fn name_on_its_own_line() {
        let (skeleton, _) = hierarchy("HIERARCHY\nROOT\nHips\n{\n OFFSET 0 0 0\n JOINT\n Spine {\n  OFFSET 0 1 0\n }\n}\n");
        let skeleton = skeleton.unwrap();
        let names: Vec<&str> = skeleton.joints.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, vec!["Hips", "Spine"]);
    }

    #[test]
    fn missing_brace_is_malformed() {
        let (skeleton, _) = hierarchy("HIERARCHY\nROOT Hips\n OFFSET 0 0 0\n}\n");
        assert!(matches!(skeleton, Err(ParseError::MalformedHierarchy { .. })));

        let (skeleton, _) = hierarchy("HIERARCHY\nROOT Hips\n{\n OFFSET 0 0 0\n");
        assert!(matches!(skeleton, Err(ParseError::MalformedHierarchy { .. })));
    }

    #[test]
    fn short_offset_is_malformed() {
        let (skeleton, _) = hierarchy("HIERARCHY\nROOT Hips\n{\n OFFSET 0 0\n}\n");
        match skeleton {
            Err(ParseError::MalformedHierarchy { line, .. }) => assert_eq!(line, 4),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn missing_sections() {
        let (skeleton, _) = hierarchy("ROOT Hips { }");
        assert!(matches!(skeleton, Err(ParseError::MissingSection(Section::Hierarchy))));

        let (skeleton, _) = hierarchy("HIERARCHY\nJOINT Hips { }");
        assert!(matches!(skeleton, Err(ParseError::MissingSection(Section::Root))));

        let result = parse_str("HIERARCHY\nROOT Hips\n{\n OFFSET 0 0 0\n}\n");
        assert!(matches!(result, Err(ParseError::MissingSection(Section::Motion))));
    }
}
