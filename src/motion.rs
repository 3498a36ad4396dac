//! Application of motion tracks computed by external registration tools.
//!
//! A track directory holds a `track.ini` file describing the run and one or more deformation files
//! (`*.dof`, `*.dof.gz`). Applying the track to a set of nodes writes them to `in.vtk`, runs the
//! point transformation tool once per deformation file to produce `out####.vtk`, and reads the
//! transformed nodes back as a time series.
use crate::concurrency::{sum_result_map, BatchProgram, WorkerPool};
use crate::dataset::Dataset;
use crate::error::Error;
use crate::io::config::{read_basic_config, store_basic_config, ConfigValue};
use crate::matrix::Vec3Matrix;
use eyre::{eyre, WrapErr};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub use crate::io::vtk::{read_poly_nodes, write_poly_nodes};

/// Name of the metadata file of a track directory.
pub const TRACK_CONF_NAME: &str = "track.ini";
/// Optional file of a track directory listing one time per deformation file.
pub const TIMES_FILE_NAME: &str = "times.txt";
/// Nodes given to the transformation tool.
pub const INPUT_NODES_NAME: &str = "in.vtk";

/// Keys of `track.ini`.
pub mod keys {
    pub const TRACK_TYPE: &str = "tracktype";
    pub const TIMESTEPS: &str = "timesteps";
    pub const TRANSFORM: &str = "transform";
    pub const PIXDIM: &str = "pixdim";
    pub const TRACK_OBJ: &str = "trackobj";
    pub const MASK_OBJ: &str = "maskobj";
    pub const TRACK_FILE: &str = "trackfile";
    pub const MASK_FILE: &str = "maskfile";
    pub const PARAM_FILE: &str = "paramfile";
    pub const ADAPTIVE: &str = "adaptive";
    pub const START_DATE: &str = "startdate";
    pub const RESULT_CODE: &str = "resultcode";
    pub const NUM_TRACK_FILES: &str = "numtrackfiles";
}

/// The registration program a track was computed with.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackType {
    MotionTrackMultiImage,
    GpuNReg,
    MirtkRegister,
    MirtkRegister1File,
}

impl TrackType {
    pub const ALL: [TrackType; 4] = [
        Self::MotionTrackMultiImage,
        Self::GpuNReg,
        Self::MirtkRegister,
        Self::MirtkRegister1File,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::MotionTrackMultiImage => "motiontrackmultimage",
            Self::GpuNReg => "gpunreg",
            Self::MirtkRegister => "mirtkregister",
            Self::MirtkRegister1File => "mirtkregister1file",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.name() == name)
    }

    /// Whether each deformation file maps one frame to the next rather than frame 0 to frame `n`.
    pub fn is_frame_by_frame(&self) -> bool {
        matches!(self, Self::GpuNReg | Self::MirtkRegister)
    }
}

/// Contents of a `track.ini` file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackConfig {
    pub track_type: TrackType,
    pub timesteps: Vec<f64>,
    /// Volume transform of the tracked image as translation, scale and rotation components.
    pub transform: Option<Vec<f64>>,
    pub pixdim: Option<Vec<f64>>,
    pub track_obj: Option<String>,
    pub mask_obj: Option<String>,
    pub param_file: Option<String>,
    pub adaptive: Option<f64>,
    pub start_date: Option<String>,
    pub result_code: Option<i64>,
    /// Keys not covered by the fields above.
    pub extra: BTreeMap<String, ConfigValue>,
}

fn optional_str(values: &BTreeMap<String, ConfigValue>, key: &str) -> eyre::Result<Option<String>> {
    match values.get(key) {
        None | Some(ConfigValue::None) => Ok(None),
        Some(value) => value
            .as_str()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| eyre!("Expected a string for {:?}, found {}", key, value)),
    }
}

fn optional_floats(values: &BTreeMap<String, ConfigValue>, key: &str) -> eyre::Result<Option<Vec<f64>>> {
    match values.get(key) {
        None | Some(ConfigValue::None) => Ok(None),
        Some(value) => value
            .as_float_list()
            .map(Some)
            .ok_or_else(|| eyre!("Expected a list of numbers for {:?}, found {}", key, value)),
    }
}

impl TrackConfig {
    pub fn new(track_type: TrackType, timesteps: Vec<f64>) -> Self {
        Self {
            track_type,
            timesteps,
            transform: None,
            pixdim: None,
            track_obj: None,
            mask_obj: None,
            param_file: None,
            adaptive: None,
            start_date: None,
            result_code: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn from_values(values: &BTreeMap<String, ConfigValue>) -> eyre::Result<Self> {
        let type_name = values
            .get(keys::TRACK_TYPE)
            .and_then(ConfigValue::as_str)
            .ok_or_else(|| eyre!("Track configuration has no {:?}", keys::TRACK_TYPE))?;
        let track_type = TrackType::from_name(type_name).ok_or_else(|| eyre!("Unknown track type {:?}", type_name))?;
        let timesteps = optional_floats(values, keys::TIMESTEPS)?
            .ok_or_else(|| eyre!("Track configuration has no {:?}", keys::TIMESTEPS))?;

        let adaptive = match values.get(keys::ADAPTIVE) {
            None | Some(ConfigValue::None) => None,
            Some(value) => Some(
                value
                    .as_float()
                    .ok_or_else(|| eyre!("Expected a number for {:?}, found {}", keys::ADAPTIVE, value))?,
            ),
        };
        let result_code = match values.get(keys::RESULT_CODE) {
            None | Some(ConfigValue::None) => None,
            Some(value) => Some(
                value
                    .as_int()
                    .ok_or_else(|| eyre!("Expected an integer for {:?}, found {}", keys::RESULT_CODE, value))?,
            ),
        };

        let known = [
            keys::TRACK_TYPE,
            keys::TIMESTEPS,
            keys::TRANSFORM,
            keys::PIXDIM,
            keys::TRACK_OBJ,
            keys::MASK_OBJ,
            keys::PARAM_FILE,
            keys::ADAPTIVE,
            keys::START_DATE,
            keys::RESULT_CODE,
        ];
        let extra = values
            .iter()
            .filter(|(k, _)| !known.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(Self {
            track_type,
            timesteps,
            transform: optional_floats(values, keys::TRANSFORM)?,
            pixdim: optional_floats(values, keys::PIXDIM)?,
            track_obj: optional_str(values, keys::TRACK_OBJ)?,
            mask_obj: optional_str(values, keys::MASK_OBJ)?,
            param_file: optional_str(values, keys::PARAM_FILE)?,
            adaptive,
            start_date: optional_str(values, keys::START_DATE)?,
            result_code,
            extra,
        })
    }

    pub fn to_values(&self) -> BTreeMap<String, ConfigValue> {
        let tuple = |v: &Vec<f64>| ConfigValue::Tuple(v.iter().copied().map(ConfigValue::Float).collect());
        let mut values = self.extra.clone();
        let mut set = |key: &str, value: ConfigValue| {
            values.insert(key.to_string(), value);
        };
        set(keys::TRACK_TYPE, self.track_type.name().into());
        set(keys::TIMESTEPS, self.timesteps.clone().into());
        if let Some(transform) = &self.transform {
            set(keys::TRANSFORM, tuple(transform));
        }
        if let Some(pixdim) = &self.pixdim {
            set(keys::PIXDIM, tuple(pixdim));
        }
        set(keys::TRACK_OBJ, self.track_obj.clone().into());
        set(keys::MASK_OBJ, self.mask_obj.clone().into());
        set(keys::PARAM_FILE, self.param_file.clone().into());
        set(keys::ADAPTIVE, self.adaptive.into());
        set(keys::START_DATE, self.start_date.clone().into());
        set(keys::RESULT_CODE, self.result_code.into());
        values
    }

    /// Reads the `track.ini` file of `trackdir`.
    pub fn read(trackdir: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = trackdir.as_ref().join(TRACK_CONF_NAME);
        let values = read_basic_config(&path)?;
        Self::from_values(&values).wrap_err_with(|| format!("Invalid track configuration {:?}", path))
    }

    /// Writes the `track.ini` file of `trackdir`.
    pub fn store(&self, trackdir: impl AsRef<Path>) -> eyre::Result<()> {
        store_basic_config(trackdir.as_ref().join(TRACK_CONF_NAME), &self.to_values())
    }
}

fn is_dof_file(path: &Path) -> bool {
    path.is_file()
        && path
            .file_name()
            .map_or(false, |name| name.to_string_lossy().contains(".dof"))
}

/// Deformation files of `trackdir` in name order.
pub fn track_files(trackdir: impl AsRef<Path>) -> eyre::Result<Vec<PathBuf>> {
    let trackdir = trackdir.as_ref();
    let mut files = Vec::new();
    for entry in std::fs::read_dir(trackdir).wrap_err_with(|| format!("Cannot list {:?}", trackdir))? {
        let path = entry?.path();
        if is_dof_file(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Whether `path` is a directory with a `track.ini` file and at least one deformation file.
pub fn is_track_dir(path: impl AsRef<Path>) -> bool {
    let path = path.as_ref();
    path.join(TRACK_CONF_NAME).is_file() && track_files(path).map_or(false, |files| !files.is_empty())
}

/// Times listed in the `times.txt` file of `trackdir`, if there is one.
pub fn read_track_times(trackdir: impl AsRef<Path>) -> eyre::Result<Option<Vec<f64>>> {
    let path = trackdir.as_ref().join(TIMES_FILE_NAME);
    if !path.is_file() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(&path).wrap_err_with(|| format!("Cannot read {:?}", path))?;
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| {
            l.parse::<f64>()
                .wrap_err_with(|| format!("Invalid time {:?} in {:?}", l, path))
        })
        .collect::<eyre::Result<Vec<_>>>()
        .map(Some)
}

/// The point transformation program and how to invoke it.
#[derive(Debug, Clone)]
pub struct TransformTool {
    pub exe: PathBuf,
    /// Directory of native libraries the program needs.
    pub library_dir: Option<PathBuf>,
    pub invert: bool,
    pub extra_args: Vec<String>,
    pub timeout: Option<Duration>,
}

impl TransformTool {
    /// The program at `exe`, writing ASCII output.
    pub fn new(exe: impl Into<PathBuf>) -> Self {
        Self {
            exe: exe.into(),
            library_dir: None,
            invert: false,
            extra_args: vec!["-ascii".to_string()],
            timeout: None,
        }
    }
}

/// One invocation of the transformation program.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackStep {
    pub input: String,
    pub output: String,
    pub dof: PathBuf,
    /// Time selected from the deformation, none to use the whole file.
    pub time: Option<f64>,
}

impl TrackStep {
    pub fn args(&self, tool: &TransformTool) -> Vec<String> {
        let mut args = vec![
            self.input.clone(),
            self.output.clone(),
            "-dofin".to_string(),
            self.dof.to_string_lossy().to_string(),
        ];
        if tool.invert {
            args.push("-invert".to_string());
        }
        if let Some(time) = self.time {
            args.push("-St".to_string());
            args.push(time.to_string());
        }
        args.extend(tool.extra_args.iter().cloned());
        args
    }
}

/// Name of the output nodes file of step `i`.
pub fn output_nodes_name(i: usize) -> String {
    format!("out{:04}.vtk", i)
}

/// Plans the steps applying the deformation files `dofs` of a track to reach every timestep after
/// the first.
///
/// There must be one file per step. A single file may instead serve every step when the track is
/// not frame-by-frame, the time of each step then being selected from it. Times come from `times`
/// if given, otherwise from the timesteps for a single file.
pub fn plan_track_steps(config: &TrackConfig, dofs: &[PathBuf], times: Option<&[f64]>) -> eyre::Result<Vec<TrackStep>> {
    let steps = config
        .timesteps
        .len()
        .checked_sub(1)
        .filter(|&n| n > 0)
        .ok_or_else(|| eyre!("Track needs at least two timesteps, found {}", config.timesteps.len()))?;
    let frame_by_frame = config.track_type.is_frame_by_frame();

    let single = dofs.len() == 1 && steps > 1;
    let dofs: Vec<PathBuf> = match dofs.len() {
        n if n == steps => dofs.to_vec(),
        1 if !frame_by_frame => vec![dofs[0].clone(); steps],
        1 => {
            return Err(eyre!(
                "A single deformation file cannot be applied frame by frame over {} steps",
                steps
            ))
        }
        n => return Err(eyre!("Found {} deformation files for {} timesteps", n, steps + 1)),
    };

    let times: Vec<Option<f64>> = match times {
        Some(times) if times.len() < steps => {
            return Err(eyre!("{} has {} times for {} steps", TIMES_FILE_NAME, times.len(), steps))
        }
        Some(times) => times[..steps].iter().map(|&t| (t >= 0.0).then(|| t)).collect(),
        None if single => config.timesteps[..steps].iter().map(|&t| Some(t)).collect(),
        None => vec![None; steps],
    };

    Ok(dofs
        .into_iter()
        .zip(times)
        .enumerate()
        .map(|(i, (dof, time))| TrackStep {
            input: INPUT_NODES_NAME.to_string(),
            output: output_nodes_name(i),
            dof,
            time,
        })
        .collect())
}

/// Runs `steps` with `tool` in `trackdir`, distributing them over the workers of `pool`.
pub fn run_track_steps(pool: &WorkerPool, tool: &TransformTool, trackdir: &Path, steps: &[TrackStep]) -> eyre::Result<()> {
    let jobs: Arc<Vec<Vec<String>>> = Arc::new(steps.iter().map(|s| s.args(tool)).collect());
    let program_name = tool.exe.to_string_lossy().to_string();
    let (tool, cwd) = (tool.clone(), trackdir.to_path_buf());
    let job_args = Arc::clone(&jobs);

    log::info!("Applying {} deformation files in {:?}", steps.len(), trackdir);
    let results = pool.run(jobs.len(), 0, None, move |worker| {
        let mut outputs = Vec::new();
        for i in worker.progress_range() {
            worker.check_stop()?;
            let mut program = BatchProgram::new(&tool.exe).args(&job_args[i]).cwd(&cwd);
            if let Some(dir) = &tool.library_dir {
                program = program.library_dir(dir);
            }
            if let Some(timeout) = tool.timeout {
                program = program.timeout(timeout);
            }
            // Launch failures are reported like a failed run
            let output = program.run().map_err(|err| Error::ExternalTool {
                code: -1,
                output: format!("{:#}", err),
            })?;
            outputs.push((i, output));
        }
        Ok(outputs)
    })?;

    for (i, output) in sum_result_map(results)? {
        output
            .into_result(&program_name)
            .wrap_err_with(|| format!("Command failed: {} {}", program_name, jobs[i].join(" ")))?;
    }
    Ok(())
}

/// Nodes of a time series after applying frame-by-frame deformations.
///
/// Each deformation moves the nodes of the first frame to the next frame, so the displacement of
/// frame `i` is added onto the accumulated frame `i - 1`.
pub fn accumulate_frame_by_frame(initial: &[Point3<f64>], frames: &mut [Vec<Point3<f64>>]) {
    for i in 0..frames.len() {
        let (done, rest) = frames.split_at_mut(i);
        let previous = done.last().map_or(initial, |p| p.as_slice());
        for ((node, start), prev) in rest[0].iter_mut().zip(initial).zip(previous) {
            *node = prev + (*node - start);
        }
    }
}

/// A time series of datasets with the timesteps they belong to.
#[derive(Debug)]
pub struct TrackedSeries {
    pub timesteps: Vec<f64>,
    pub datasets: Vec<Dataset>,
}

/// Applies the motion track in `trackdir` to the nodes of `ds`.
///
/// The first dataset of the result is a copy of `ds`; each following one shares its topology and
/// fields and has the transformed nodes of the next timestep of the track.
pub fn apply_motion_track(
    pool: &WorkerPool,
    tool: &TransformTool,
    ds: &Dataset,
    trackdir: impl AsRef<Path>,
) -> eyre::Result<TrackedSeries> {
    let trackdir = trackdir.as_ref();
    let config = TrackConfig::read(trackdir)?;
    let dofs = track_files(trackdir)?;
    if dofs.is_empty() {
        return Err(eyre!("No deformation files in {:?}", trackdir));
    }
    let times = read_track_times(trackdir)?;
    let steps = plan_track_steps(&config, &dofs, times.as_deref())?;
    let frame_by_frame = config.track_type.is_frame_by_frame() && dofs.len() > 1;

    write_poly_nodes(trackdir.join(INPUT_NODES_NAME), ds.nodes())?;
    run_track_steps(pool, tool, trackdir, &steps)?;

    let initial = ds.nodes().points();
    let mut frames = Vec::with_capacity(steps.len());
    for step in &steps {
        let path = trackdir.join(&step.output);
        let nodes = read_poly_nodes(&path, "nodes")?.points();
        if nodes.len() != initial.len() {
            return Err(eyre!("{:?} has {} nodes, expected {}", path, nodes.len(), initial.len()));
        }
        frames.push(nodes);
    }
    if frame_by_frame {
        accumulate_frame_by_frame(&initial, &mut frames);
    }

    let mut datasets = vec![ds.clone_with(format!("{}clone0", ds.name()), true, true, true)];
    for (i, frame) in frames.iter().enumerate() {
        let mut next = ds.clone_with(format!("{}clone{}", ds.name(), i + 1), false, false, false);
        next.set_nodes(Vec3Matrix::from_points(ds.nodes().name(), frame));
        datasets.push(next);
    }

    log::info!(
        "Tracked {:?} over {} timesteps{}",
        ds.name(),
        datasets.len(),
        if frame_by_frame { " frame by frame" } else { "" }
    );
    Ok(TrackedSeries {
        timesteps: config.timesteps,
        datasets,
    })
}
