use bevy::prelude::*;
use bevy_panorbit_camera::{PanOrbitCamera, PanOrbitCameraPlugin};
use std::path::PathBuf;
use std::sync::Arc;

use crate::loader::{Loader, LoaderConfig, Slot, SlotState};
use crate::sample::AnimationState;
use crate::types::{Bvh, Index, JointTransform, Position, Quaternion};

///////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Resource)]
pub struct ViewerState {
    pub loader: Loader,
    pub files: Vec<PathBuf>,
    pub slots: Vec<Arc<Slot>>,
    pub active: usize,
    /// Clip of the active slot that `playback` refers to
    pub shown: Option<Arc<Bvh>>,
    pub kinematic_chains: Vec<Vec<Index>>,
    pub playback: AnimationState,
    pub rest_pose_mode: bool,
    pub scale: f32,
    pub debug_text: bool,
}

impl ViewerState {
    /// Queue the active file and the next one, cancel whatever else is still waiting.
    fn request_loads(&mut self) {
        let count = self.slots.len();
        let wanted = [self.active, (self.active + 1) % count];
        for (i, slot) in self.slots.iter().enumerate() {
            if wanted.contains(&i) {
                if slot.state() == SlotState::Empty {
                    self.loader.enqueue(self.files[i].clone(), slot);
                }
            } else if slot.state() == SlotState::Queued {
                self.loader.cancel(slot);
            }
        }
    }

    /// Pick up a freshly loaded clip for the active slot.
    fn refresh_shown(&mut self) {
        let current = self.slots[self.active].result();
        let changed = match (&current, &self.shown) {
            (Some(a), Some(b)) => !Arc::ptr_eq(a, b),
            (None, None) => false,
            _ => true,
        };
        if changed {
            self.kinematic_chains = current
                .as_ref()
                .map(|bvh| bvh.skeleton.kinematic_chains())
                .unwrap_or_default();
            self.playback = AnimationState::new();
            self.shown = current;
        }
    }

    fn switch(&mut self, delta: isize) {
        let count = self.slots.len() as isize;
        self.active = (self.active as isize + delta).rem_euclid(count) as usize;
        self.request_loads();
        self.refresh_shown();
    }
}

///////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

/// Open a window playing `files` one at a time; N / P switch between them.
pub fn visualize_files(files: Vec<PathBuf>, scale: f32) -> std::io::Result<()> {
    if files.is_empty() {
        return Ok(());
    }
    let loader = Loader::spawn(LoaderConfig::default())?;
    let slots = files.iter().map(|_| Slot::new()).collect();

    let mut state = ViewerState {
        loader,
        files,
        slots,
        active: 0,
        shown: None,
        kinematic_chains: Vec::new(),
        playback: AnimationState::new(),
        rest_pose_mode: false,
        scale: 1.0 / scale, // reciprocal for historical/laziness reasons xdd
        debug_text: false,
    };
    state.request_loads();

    App::new()
        .insert_resource(state)
        .add_plugins(DefaultPlugins)
        .add_plugins(PanOrbitCameraPlugin)
        .add_systems(Startup, setup)
        .add_systems(Update, (update_main, draw_skeleton, update_debug_text).chain())
        .run();
    Ok(())
}

///////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

// A unit struct to help identify the debug UI component, since there may be many Text components
#[derive(Component)]
struct DebugText;

///////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

fn setup(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    //// Orbit camera
    commands.spawn((
        Camera3dBundle {
            transform: Transform::from_xyz(0., 1.5, 6.).looking_at(Vec3::ZERO, Vec3::Y),
            ..default()
        },
        PanOrbitCamera::default(),
    ));
    // draw plane
    commands.spawn(PbrBundle {
        mesh: meshes.add(Plane3d::default().mesh().size(5.0, 5.0)),
        material: materials.add(StandardMaterial {
            base_color: Color::rgba(1., 1., 1., 0.5),
            alpha_mode: AlphaMode::Blend,
            double_sided: true,
            cull_mode: None,
            ..default()
        }),
        ..default()
    });

    // draw instructions
    commands.spawn(
        TextBundle::from_section(
            "Press 'Space' to pause\n\
            Press 'Left' or 'Right' to step frames\n\
            Press 'N' or 'P' to switch files\n\
            Press 'R' to toggle rest pose mode\n\
            Press 'D' to toggle debug text\n\
            Hold 'Up' or 'Down' to change the line width\n",
            TextStyle {
                font_size: 15.,
                ..default()
            },
        )
        .with_style(Style {
            position_type: PositionType::Absolute,
            bottom: Val::Px(12.0),
            right: Val::Px(12.0),
            ..default()
        }),
    );

    // draw debug text
    commands.spawn((
        TextBundle::from_section(
            "",
            TextStyle {
                font_size: 17.,
                color: Color::rgba(1.0, 1.0, 1.0, 0.5),
                ..default()
            },
        )
        .with_style(Style {
            position_type: PositionType::Absolute,
            display: Display::Flex,
            top: Val::Px(12.0),
            left: Val::Px(12.0),
            ..default()
        }),
        DebugText,
    ));
}

///////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

fn to_vec3(position: &Position, scale: f32) -> Vec3 {
    Vec3::new(position.x as f32, position.y as f32, position.z as f32) / scale
}

/// Draw joint axes (red, green, blue) at the joint position.
fn draw_joint_axes(gizmos: &mut Gizmos, rotation: &Quaternion, position: &Position, scale: f32) {
    let position = to_vec3(position, scale);
    let rotation: cgmath::Matrix3<f64> = cgmath::Matrix3::from(*rotation);
    // axes are 5 units long
    let x_axis = to_vec3(&(rotation.x * 5.0), scale) + position;
    let y_axis = to_vec3(&(rotation.y * 5.0), scale) + position;
    let z_axis = to_vec3(&(rotation.z * 5.0), scale) + position;

    gizmos.line(position, x_axis, Color::RED);
    gizmos.line(position, y_axis, Color::GREEN);
    gizmos.line(position, z_axis, Color::BLUE);
}

/// Draw a sphere at the joint position.
fn draw_joint_sphere(gizmos: &mut Gizmos, position: &Position, scale: f32) {
    let position = to_vec3(position, scale);
    gizmos.sphere(position, Quat::IDENTITY, 0.1 / scale, Color::WHITE);
}

/// Draw the bone of a leaf joint towards its End Site.
fn draw_bone_tail(gizmos: &mut Gizmos, transform: &JointTransform, end: &Position, scale: f32) {
    use cgmath::Rotation;
    let tail = transform.disp + transform.rot.rotate_vector(*end);
    gizmos.line(to_vec3(&transform.disp, scale), to_vec3(&tail, scale), Color::ORANGE);
}

///////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

fn draw_skeleton(mut gizmos: Gizmos, mut state: ResMut<ViewerState>) {
    let Some(bvh) = state.shown.clone() else {
        return;
    };
    let scale = state.scale;
    let pose: Vec<JointTransform> = if state.rest_pose_mode {
        bvh.skeleton.rest_pose()
    } else {
        state.playback.world_transforms(&bvh).to_vec()
    };

    //// Draw the skeleton lines
    for chain in state.kinematic_chains.iter() {
        let positions = chain
            .iter()
            .map(|&joint_index| to_vec3(&pose[joint_index].disp, scale))
            .collect::<Vec<_>>();
        gizmos.linestrip(positions, Color::YELLOW);
    }

    //// Draw the joints as spheres. Draw the axes of the joints.
    for joint in &bvh.skeleton.joints {
        let transform = &pose[joint.index];
        draw_joint_sphere(&mut gizmos, &transform.disp, scale);
        draw_joint_axes(&mut gizmos, &transform.rot, &transform.disp, scale);
        if joint.end_site.is_some() {
            draw_bone_tail(&mut gizmos, transform, &joint.end, scale);
        }
    }

    //// draw identity axes for reference
    draw_joint_axes(
        &mut gizmos,
        &<Quaternion as cgmath::One>::one(),
        &<Position as cgmath::Zero>::zero(),
        10.0,
    );
}

///////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

fn update_main(
    mut config_store: ResMut<GizmoConfigStore>,
    keyboard: Res<ButtonInput<KeyCode>>,
    time: Res<Time>,
    mut state: ResMut<ViewerState>,
) {
    let (config, _) = config_store.config_mut::<DefaultGizmoConfigGroup>();
    if keyboard.pressed(KeyCode::ArrowUp) {
        config.line_width += 5. * time.delta_seconds();
        config.line_width = config.line_width.clamp(0., 50.);
    }
    if keyboard.pressed(KeyCode::ArrowDown) {
        config.line_width -= 5. * time.delta_seconds();
        config.line_width = config.line_width.clamp(0., 50.);
    }

    if keyboard.just_released(KeyCode::KeyN) {
        state.switch(1);
    }
    if keyboard.just_released(KeyCode::KeyP) {
        state.switch(-1);
    }
    if keyboard.just_released(KeyCode::KeyR) {
        state.rest_pose_mode = !state.rest_pose_mode;
    }
    if keyboard.just_released(KeyCode::KeyD) {
        state.debug_text = !state.debug_text;
    }

    state.request_loads();
    state.refresh_shown();
    let Some(bvh) = state.shown.clone() else {
        return;
    };

    if keyboard.just_released(KeyCode::Space) {
        state.playback.toggle_pause();
    }
    if keyboard.just_released(KeyCode::ArrowRight) {
        state.playback.set_paused(true);
        state.playback.step(&bvh, 1);
    }
    if keyboard.just_released(KeyCode::ArrowLeft) {
        state.playback.set_paused(true);
        state.playback.step(&bvh, -1);
    }

    state.playback.update(&bvh, time.delta_seconds_f64());
}

///////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

fn update_debug_text(mut query: Query<&mut Text, With<DebugText>>, mut state: ResMut<ViewerState>) {
    let active = state.active;
    let slot_state = state.slots[active].state();
    let mut t = format!("{} [{:?}]\n", state.files[active].display(), slot_state);

    if let Some(bvh) = state.shown.clone() {
        t += &format!(
            "Frame: {:.2} / {}{}\n",
            state.playback.frame(),
            bvh.motion.frame_count,
            if state.playback.is_paused() { " (paused)" } else { "" }
        );
        t += "=============== GLOBAL POSITIONS AND ROTATIONS ===============\n";
        let pose = state.playback.world_transforms(&bvh).to_vec();
        for joint in &bvh.skeleton.joints {
            let transform = &pose[joint.index];
            // create 3 column table with joint name, position, rotation
            t += &format!(
                "{:.<20} {: ^40} {: ^40}\n",
                joint.name,
                format!("{:6.2?}", transform.disp),
                format!("{:6.2?}", transform.rot)
            );
        }
    }

    for mut text in &mut query {
        text.sections[0].value = if state.debug_text { t.clone() } else { String::new() };
    }
}
