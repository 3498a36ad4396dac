use crate::test_dir;
use eidolon::concurrency::WorkerPool;
use eidolon::dataset::Dataset;
use eidolon::io::config::ConfigValue;
use eidolon::matrix::{IndexMatrix, Vec3Matrix};
use eidolon::motion::{
    accumulate_frame_by_frame, apply_motion_track, is_track_dir, plan_track_steps, read_track_times, track_files,
    TrackConfig, TrackStep, TrackType, TransformTool,
};
use nalgebra::Point3;
use std::path::{Path, PathBuf};

fn dofs(n: usize) -> Vec<PathBuf> {
    (0..n).map(|i| PathBuf::from(format!("track{}.dof.gz", i))).collect()
}

/// A track directory with a configuration over `timesteps` and `num_dofs` empty deformation files.
fn track_dir(test_name: &str, track_type: TrackType, timesteps: Vec<f64>, num_dofs: usize) -> PathBuf {
    let dir = test_dir(test_name);
    TrackConfig::new(track_type, timesteps).store(&dir).unwrap();
    for dof in dofs(num_dofs) {
        std::fs::write(dir.join(dof), b"").unwrap();
    }
    dir
}

fn triangle() -> Dataset {
    let nodes = Vec3Matrix::from_points(
        "nodes",
        &[Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.5)],
    );
    let mut tris = IndexMatrix::from_rows("tris", &[[0, 1, 2]]);
    tris.set_type_code("Tri1NL");
    Dataset::new("tri", nodes, vec![tris], Vec::new())
}

#[test]
fn one_file_per_step() {
    let config = TrackConfig::new(TrackType::GpuNReg, vec![0.0, 10.0, 20.0]);
    let steps = plan_track_steps(&config, &dofs(2), None).unwrap();
    assert_eq!(
        steps,
        vec![
            TrackStep {
                input: "in.vtk".to_string(),
                output: "out0000.vtk".to_string(),
                dof: PathBuf::from("track0.dof.gz"),
                time: None,
            },
            TrackStep {
                input: "in.vtk".to_string(),
                output: "out0001.vtk".to_string(),
                dof: PathBuf::from("track1.dof.gz"),
                time: None,
            },
        ]
    );

    let mut tool = TransformTool::new("transform-points");
    tool.invert = true;
    assert_eq!(
        steps[1].args(&tool),
        vec!["in.vtk", "out0001.vtk", "-dofin", "track1.dof.gz", "-invert", "-ascii"]
    );
}

#[test]
fn a_single_file_selects_times() {
    let config = TrackConfig::new(TrackType::MotionTrackMultiImage, vec![0.0, 10.0, 20.0]);
    let steps = plan_track_steps(&config, &dofs(1), None).unwrap();
    assert_eq!(steps.len(), 2);
    assert!(steps.iter().all(|s| s.dof == Path::new("track0.dof.gz")));
    assert_eq!(steps.iter().map(|s| s.time).collect::<Vec<_>>(), vec![Some(0.0), Some(10.0)]);
    assert_eq!(
        steps[0].args(&TransformTool::new("t")),
        vec!["in.vtk", "out0000.vtk", "-dofin", "track0.dof.gz", "-St", "0", "-ascii"]
    );

    let steps = plan_track_steps(&config, &dofs(1), Some(&[5.0, -1.0, 7.0])).unwrap();
    assert_eq!(steps.iter().map(|s| s.time).collect::<Vec<_>>(), vec![Some(5.0), None]);
}

#[test]
fn invalid_track_plans_are_rejected() {
    let frame_by_frame = TrackConfig::new(TrackType::MirtkRegister, vec![0.0, 10.0, 20.0]);
    assert!(plan_track_steps(&frame_by_frame, &dofs(1), None).is_err());
    assert!(plan_track_steps(&frame_by_frame, &dofs(3), None).is_err());
    assert!(plan_track_steps(&frame_by_frame, &dofs(2), Some(&[1.0])).is_err());

    let single_step = TrackConfig::new(TrackType::MirtkRegister1File, vec![0.0]);
    assert!(plan_track_steps(&single_step, &dofs(1), None).is_err());
}

#[test]
fn config_round_trips_with_unknown_keys() {
    let dir = test_dir("config_round_trips_with_unknown_keys");
    let mut config = TrackConfig::new(TrackType::MirtkRegister1File, vec![0.0, 33.3, 66.6]);
    config.pixdim = Some(vec![1.25, 1.25, 8.0]);
    config.track_obj = Some("cine".to_string());
    config.adaptive = Some(0.9);
    config.result_code = Some(0);
    config.extra.insert("operator".to_string(), ConfigValue::from("lab"));
    config.store(&dir).unwrap();

    assert_eq!(TrackConfig::read(&dir).unwrap(), config);
    let text = std::fs::read_to_string(dir.join("track.ini")).unwrap();
    assert!(text.contains("tracktype = 'mirtkregister1file'"));
    assert!(text.contains("pixdim = (1.25, 1.25, 8.0)"));

    std::fs::write(dir.join("track.ini"), "[DEFAULT]\ntracktype = 'unknown'\ntimesteps = [0]\n").unwrap();
    assert!(TrackConfig::read(&dir).is_err());
}

#[test]
fn track_dirs_need_config_and_deformations() {
    let dir = track_dir("track_dirs_need_config_and_deformations", TrackType::GpuNReg, vec![0.0, 1.0, 2.0], 2);
    std::fs::write(dir.join("notes.txt"), "unrelated").unwrap();
    assert!(is_track_dir(&dir));
    let names: Vec<String> = track_files(&dir)
        .unwrap()
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    assert_eq!(names, vec!["track0.dof.gz", "track1.dof.gz"]);

    assert_eq!(read_track_times(&dir).unwrap(), None);
    std::fs::write(dir.join("times.txt"), "0.5\n-1\n\n2\n").unwrap();
    assert_eq!(read_track_times(&dir).unwrap(), Some(vec![0.5, -1.0, 2.0]));
    std::fs::write(dir.join("times.txt"), "soon\n").unwrap();
    assert!(read_track_times(&dir).is_err());

    let empty = test_dir("track_dirs_need_config_and_deformations_empty");
    assert!(!is_track_dir(&empty));
}

#[test]
fn frame_by_frame_displacements_accumulate() {
    let initial = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0)];
    let mut frames = vec![
        vec![Point3::new(1.0, 0.0, 0.0), Point3::new(1.0, 1.0, 2.0)],
        vec![Point3::new(1.0, 0.0, 0.0), Point3::new(1.0, 2.0, 1.0)],
    ];
    accumulate_frame_by_frame(&initial, &mut frames);
    assert_eq!(frames[0], vec![Point3::new(1.0, 0.0, 0.0), Point3::new(1.0, 1.0, 2.0)]);
    assert_eq!(frames[1], vec![Point3::new(2.0, 0.0, 0.0), Point3::new(1.0, 2.0, 2.0)]);
}

#[test]
fn missing_tool_fails_the_track() {
    let dir = track_dir("missing_tool_fails_the_track", TrackType::GpuNReg, vec![0.0, 1.0, 2.0], 2);
    let tool = TransformTool::new("/nonexistent/transform-points");
    let pool = WorkerPool::new(2);
    assert!(apply_motion_track(&pool, &tool, &triangle(), &dir).is_err());
}

#[cfg(unix)]
#[test]
fn identity_tool_reproduces_the_nodes() {
    use std::os::unix::fs::PermissionsExt;

    let dir = track_dir(
        "identity_tool_reproduces_the_nodes",
        TrackType::MotionTrackMultiImage,
        vec![0.0, 10.0, 20.0],
        2,
    );
    let script = dir.join("copy-points.sh");
    std::fs::write(&script, "#!/bin/sh\ncp \"$1\" \"$2\"\n").unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let pool = WorkerPool::new(2);
    let ds = triangle();
    let series = apply_motion_track(&pool, &TransformTool::new(&script), &ds, &dir).unwrap();
    assert_eq!(series.timesteps, vec![0.0, 10.0, 20.0]);
    assert_eq!(series.datasets.len(), 3);
    assert_eq!(series.datasets[2].name(), "triclone2");
    for tracked in &series.datasets {
        for (a, b) in tracked.nodes().points().iter().zip(ds.nodes().points()) {
            assert!((a - b).norm() <= 1e-6);
        }
        assert_eq!(tracked.index_set("tris").unwrap().to_vec(), vec![0, 1, 2]);
    }
}
