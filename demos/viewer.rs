use bvh_anim_player::types::{Joint, JointTransform};
use bvh_anim_player::visualize::visualize_files;
use bvh_anim_player::{load_bvh_from_file, sample};
use std::path::PathBuf;

fn main() {
    let files: Vec<PathBuf> = std::env::args().skip(1).map(PathBuf::from).collect();
    let Some(first) = files.first() else {
        eprintln!("usage: viewer <file.bvh> [more.bvh ...]");
        std::process::exit(1);
    };

    ////////////////////////////// loading .bvh ///////////////////////////////////////////
    // files can be parsed directly on the calling thread...
    match load_bvh_from_file(first) {
        Ok(bvh) => {
            let skeleton = &bvh.skeleton;
            let motion = &bvh.motion;
            println!(
                "{}: {} joints, {} frames, {} fps",
                first.display(),
                skeleton.len(),
                motion.frame_count,
                motion.fps
            );

            // the root has no parent, every other joint comes after its parent
            let root: &Joint = &skeleton.joints[skeleton.root];
            assert!(root.is_root());
            for joint in &skeleton.joints[1..] {
                assert!(joint.parent.is_some_and(|parent| parent < joint.index));
            }

            // world transforms halfway between the first two frames
            let pose: Vec<JointTransform> = sample(skeleton, motion, 0.5);
            for (joint, transform) in skeleton.joints.iter().zip(&pose) {
                println!("{:.<20} {:8.2?}", joint.name, transform.disp);
            }
            for warning in &bvh.warnings {
                println!("warning: {warning}");
            }
        }
        Err(err) => eprintln!("{}: {err}", first.display()),
    }

    //////////////////////////////// visualize skeleton ////////////////
    // ...or handed to the background loader by the viewer
    // (use scale when your skeleton is in different units than meters, e.g. centimeters)
    if let Err(err) = visualize_files(files, 0.01) {
        eprintln!("could not start the loader: {err}");
    }
}
