//! Loading pipeline: reads tuning and layout files, resolves junction names,
//! and builds a [`PowerGrid`].
//!
//! Provides format detection (RON/JSON/TOML), file discovery, and
//! deserialization helpers, plus the resolution step that turns a
//! [`LayoutData`] into a wired grid.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use bathys_core::command::CommandResult;
use bathys_core::dispatcher::Dispatcher;
use bathys_core::fixed::{checked_f64_to_fixed64, f64_to_fixed64};
use bathys_core::grid::{GridError, PowerGrid};
use bathys_core::id::JunctionId;
use bathys_core::junction::Junction;
use bathys_core::part::Part;
use bathys_core::tuning::{BatteryTuning, LoadTuning, Tuning};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::schema::{JunctionData, KindData, LayoutData, PartData};

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur during data loading.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// A required data file was not found in the given directory.
    #[error("required file '{file}' not found in {dir}")]
    MissingRequired { file: String, dir: PathBuf },

    /// The file has an extension we don't support.
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// Two files with the same base name but different formats exist.
    #[error("conflicting formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    /// A deserialization error occurred.
    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// A segment names a junction the layout does not define.
    #[error("unresolved {expected_kind} reference '{name}' in {file}")]
    UnresolvedRef {
        file: PathBuf,
        name: String,
        expected_kind: &'static str,
    },

    /// Two junctions share a name.
    #[error("duplicate name '{name}' in {file}")]
    DuplicateName { file: PathBuf, name: String },

    /// A junction refused the port a segment needs.
    #[error("segment '{segment}' exceeds the port limit of '{junction}' in {file}")]
    PortLimit {
        file: PathBuf,
        segment: String,
        junction: String,
    },

    /// A junction is missing a field its kind requires, or a junction or
    /// tuning value does not fit the fixed-point range.
    #[error("invalid '{name}' in {file}: {detail}")]
    Invalid {
        file: PathBuf,
        name: String,
        detail: String,
    },

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Supported data file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

// ===========================================================================
// File discovery
// ===========================================================================

/// Scan a directory for `{base_name}.ron`, `.toml` or `.json`.
///
/// Returns `Ok(None)` if no file is found, or `Err(ConflictingFormats)` if
/// more than one format exists for the same base name.
pub fn find_data_file(dir: &Path, base_name: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let mut found: Option<PathBuf> = None;
    for ext in ["ron", "toml", "json"] {
        let candidate = dir.join(format!("{base_name}.{ext}"));
        if !candidate.exists() {
            continue;
        }
        if let Some(existing) = found {
            return Err(DataLoadError::ConflictingFormats {
                a: existing,
                b: candidate,
            });
        }
        found = Some(candidate);
    }
    Ok(found)
}

/// Like [`find_data_file`], but a missing file is an error.
pub fn require_data_file(dir: &Path, base_name: &str) -> Result<PathBuf, DataLoadError> {
    find_data_file(dir, base_name)?.ok_or_else(|| DataLoadError::MissingRequired {
        file: base_name.to_string(),
        dir: dir.to_path_buf(),
    })
}

// ===========================================================================
// Deserialization
// ===========================================================================

/// Deserialize `content` in the given format. `file` is only used in errors.
pub fn parse_str<T: DeserializeOwned>(
    content: &str,
    format: Format,
    file: &Path,
) -> Result<T, DataLoadError> {
    let parsed = match format {
        Format::Ron => ron::from_str(content).map_err(|e| e.to_string()),
        Format::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        Format::Toml => toml::from_str(content).map_err(|e| e.to_string()),
    };
    parsed.map_err(|detail| DataLoadError::Parse {
        file: file.to_path_buf(),
        detail,
    })
}

/// Read a file and deserialize it according to its extension.
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    parse_str(&content, format, path)
}

/// Load a tuning file. Missing sections and keys keep their defaults.
pub fn load_tuning(path: &Path) -> Result<Tuning, DataLoadError> {
    let tuning = deserialize_file(path)?;
    check_tuning(&tuning, path)?;
    debug!(file = %path.display(), "tuning loaded");
    Ok(tuning)
}

// ===========================================================================
// Layout resolution
// ===========================================================================

/// A built grid plus the setup lines its layout asked for.
#[derive(Debug, Clone)]
pub struct Boat {
    pub grid: PowerGrid,
    pub setup: Vec<String>,
}

impl Boat {
    /// Hand the grid to a dispatcher and run the setup lines through it.
    /// Lines that are not handled are logged and skipped.
    pub fn into_dispatcher(self) -> Dispatcher {
        let mut dispatcher = Dispatcher::new(self.grid);
        for line in &self.setup {
            let result = dispatcher.process_command(line);
            if result != CommandResult::Handled {
                warn!(line = line.as_str(), ?result, "setup line not applied");
            }
        }
        dispatcher
    }
}

fn check_tuning(tuning: &Tuning, file: &Path) -> Result<(), DataLoadError> {
    match tuning.out_of_range_field() {
        Some(field) => Err(DataLoadError::Invalid {
            file: file.to_path_buf(),
            name: field.to_string(),
            detail: "out of range".to_string(),
        }),
        None => Ok(()),
    }
}

fn make_junction(
    data: &JunctionData,
    tuning: &Tuning,
    file: &Path,
) -> Result<Junction, DataLoadError> {
    let require = |value: Option<f64>, field: &str| {
        value.ok_or_else(|| DataLoadError::Invalid {
            file: file.to_path_buf(),
            name: data.name.clone(),
            detail: format!("{field} is required for this kind"),
        })
    };
    let in_range = |value: f64, field: &str| {
        checked_f64_to_fixed64(value)
            .map(|_| value)
            .ok_or_else(|| DataLoadError::Invalid {
                file: file.to_path_buf(),
                name: data.name.clone(),
                detail: format!("{field} is out of range"),
            })
    };
    let capacity = data.capacity.map(|v| in_range(v, "capacity")).transpose()?;
    let usage = data.usage.map(|v| in_range(v, "usage")).transpose()?;
    let name = data.name.clone();
    let mut junction = match data.kind {
        KindData::Bus => Junction::bus(name),
        KindData::Selector => Junction::selector(name),
        KindData::SingleThrow => Junction::single_throw(name),
        KindData::DoubleThrow => Junction::double_throw(name),
        KindData::Feeder => Junction::feeder(name, f64_to_fixed64(require(capacity, "capacity")?)),
        KindData::Battery => {
            let battery = BatteryTuning {
                capacity: capacity.unwrap_or(tuning.battery.capacity),
                ..tuning.battery.clone()
            };
            Junction::battery(name, &battery)
        }
        KindData::Load => Junction::load(name, f64_to_fixed64(require(usage, "usage")?)),
        KindData::Consumer => {
            let load = LoadTuning {
                active_usage: usage.unwrap_or(tuning.load.active_usage),
                ..tuning.load.clone()
            };
            Junction::consumer(name, &load)
        }
    };
    for part in &data.parts {
        junction = junction.with_part(match part {
            PartData::OnOff => Part::on_off(),
            PartData::ExtendRetract => Part::extend_retract(&tuning.actuator),
            PartData::OpenClose => Part::open_close(&tuning.actuator),
        });
    }
    Ok(junction)
}

/// Build a grid from a parsed layout. `file` is only used in errors.
pub fn build_grid(
    layout: &LayoutData,
    tuning: &Tuning,
    file: &Path,
) -> Result<PowerGrid, DataLoadError> {
    check_tuning(tuning, file)?;
    let mut grid = PowerGrid::new();
    let mut ids: HashMap<String, JunctionId> = HashMap::new();

    for data in &layout.junctions {
        let junction = make_junction(data, tuning, file)?;
        let id = grid.add_junction(junction).map_err(|err| match err {
            GridError::DuplicateName(name) => DataLoadError::DuplicateName {
                file: file.to_path_buf(),
                name,
            },
            other => DataLoadError::Invalid {
                file: file.to_path_buf(),
                name: data.name.clone(),
                detail: other.to_string(),
            },
        })?;
        ids.insert(data.name.clone(), id);
    }

    for segment in &layout.segments {
        let resolve = |name: &str| {
            ids.get(name).copied().ok_or_else(|| DataLoadError::UnresolvedRef {
                file: file.to_path_buf(),
                name: name.to_string(),
                expected_kind: "junction",
            })
        };
        let a = resolve(&segment.from.junction)?;
        let b = resolve(&segment.to.junction)?;
        let id = grid
            .connect(
                segment.name.clone(),
                (a, segment.from.side, segment.from.offset),
                (b, segment.to.side, segment.to.offset),
            )
            .map_err(|err| match err {
                GridError::PortLimit { name } => DataLoadError::PortLimit {
                    file: file.to_path_buf(),
                    segment: segment.name.clone(),
                    junction: name,
                },
                other => DataLoadError::Invalid {
                    file: file.to_path_buf(),
                    name: segment.name.clone(),
                    detail: other.to_string(),
                },
            })?;
        grid.set_segment_status(id, segment.status);
    }

    debug!(
        file = %file.display(),
        junctions = grid.junction_count(),
        segments = grid.segment_count(),
        "layout built"
    );
    Ok(grid)
}

/// Load and build a layout file.
pub fn load_layout(path: &Path, tuning: &Tuning) -> Result<Boat, DataLoadError> {
    let layout: LayoutData = deserialize_file(path)?;
    let grid = build_grid(&layout, tuning, path)?;
    Ok(Boat {
        grid,
        setup: layout.setup,
    })
}

/// Load a boat from a directory holding `layout.{ron,toml,json}` and an
/// optional `tuning.{ron,toml,json}`.
pub fn load_boat_dir(dir: &Path) -> Result<Boat, DataLoadError> {
    let tuning = match find_data_file(dir, "tuning")? {
        Some(path) => load_tuning(&path)?,
        None => Tuning::default(),
    };
    let layout = require_data_file(dir, "layout")?;
    load_layout(&layout, &tuning)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use bathys_core::fixed::Fixed64;
    use bathys_core::propagation::propagate_power;
    use bathys_core::segment::SegmentStatus;
    use std::fs;

    /// Create a temporary directory with a unique name for test isolation.
    fn make_test_dir(suffix: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "bathys_data_test_{suffix}_{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn cleanup(dir: &Path) {
        let _ = fs::remove_dir_all(dir);
    }

    const LAYOUT_RON: &str = r#"(
        junctions: [
            (name: "GEN", kind: feeder, capacity: Some(20.0)),
            (name: "BUS", kind: bus),
            (name: "PUMP", kind: consumer, usage: Some(8.0)),
            (name: "HATCH", kind: load, usage: Some(1.0), parts: [open_close]),
        ],
        segments: [
            (name: "GEN-BUS", from: (junction: "GEN", side: Right), to: (junction: "BUS")),
            (name: "BUS-PUMP", from: (junction: "BUS"), to: (junction: "PUMP")),
            (name: "BUS-HATCH", from: (junction: "BUS"), to: (junction: "HATCH"), status: Opened),
        ],
        setup: ["PUMP.ON SET true"],
    )"#;

    // -----------------------------------------------------------------------
    // detect_format
    // -----------------------------------------------------------------------

    #[test]
    fn detect_format_by_extension() {
        assert_eq!(detect_format(Path::new("boat.ron")).unwrap(), Format::Ron);
        assert_eq!(detect_format(Path::new("boat.toml")).unwrap(), Format::Toml);
        assert_eq!(detect_format(Path::new("boat.json")).unwrap(), Format::Json);
    }

    #[test]
    fn detect_format_unsupported() {
        for name in ["boat.yaml", "boat"] {
            assert!(matches!(
                detect_format(Path::new(name)),
                Err(DataLoadError::UnsupportedFormat { .. })
            ));
        }
    }

    // -----------------------------------------------------------------------
    // Tuning
    // -----------------------------------------------------------------------

    #[test]
    fn tuning_ron_overrides_keep_defaults() {
        let tuning: Tuning = parse_str(
            "(load: (active_usage: 7.5), actuator: (move_seconds: 3.0))",
            Format::Ron,
            Path::new("tuning.ron"),
        )
        .unwrap();
        assert_eq!(tuning.load.active_usage, 7.5);
        assert_eq!(tuning.load.idle_usage, 0.1);
        assert_eq!(tuning.actuator.move_seconds, 3.0);
        assert_eq!(tuning.battery, BatteryTuning::default());
    }

    #[test]
    fn tuning_toml_and_json() {
        let toml: Tuning = parse_str(
            "[battery]\ncapacity = 250.0\n",
            Format::Toml,
            Path::new("tuning.toml"),
        )
        .unwrap();
        assert_eq!(toml.battery.capacity, 250.0);
        assert_eq!(toml.battery.charging_draw, 6.0);

        let json: Tuning = parse_str(
            r#"{"battery": {"discharge_rate": 0.5}}"#,
            Format::Json,
            Path::new("tuning.json"),
        )
        .unwrap();
        assert_eq!(json.battery.discharge_rate, 0.5);
        assert_eq!(json.load, LoadTuning::default());
    }

    #[test]
    fn parse_error_names_the_file() {
        let err = parse_str::<Tuning>("(load: ", Format::Ron, Path::new("bad.ron")).unwrap_err();
        match err {
            DataLoadError::Parse { file, .. } => assert_eq!(file, PathBuf::from("bad.ron")),
            other => panic!("unexpected error: {other}"),
        }
    }

    // -----------------------------------------------------------------------
    // Layout resolution
    // -----------------------------------------------------------------------

    #[test]
    fn ron_layout_builds_and_runs() {
        let layout: LayoutData = parse_str(LAYOUT_RON, Format::Ron, Path::new("layout.ron")).unwrap();
        let mut grid = build_grid(&layout, &Tuning::default(), Path::new("layout.ron")).unwrap();
        assert_eq!(grid.junction_count(), 4);
        assert_eq!(grid.segment_count(), 3);
        let hatch_seg = grid.segment_ids()[2];
        assert_eq!(grid.segment(hatch_seg).unwrap().status(), SegmentStatus::Opened);

        // PUMP is still off: idle draw only.
        propagate_power(&mut grid);
        assert_eq!(grid.power_level(grid.segment_ids()[0]), f64_to_fixed64(0.1));
        assert_eq!(grid.power_level(hatch_seg), Fixed64::ZERO);
        assert_eq!(
            grid.junction_by_name("HATCH").unwrap().parts().len(),
            1
        );
    }

    #[test]
    fn setup_lines_run_through_dispatcher() {
        let layout: LayoutData = parse_str(LAYOUT_RON, Format::Ron, Path::new("layout.ron")).unwrap();
        let grid = build_grid(&layout, &Tuning::default(), Path::new("layout.ron")).unwrap();
        let mut dispatcher = Boat {
            grid,
            setup: layout.setup,
        }
        .into_dispatcher();
        assert_eq!(dispatcher.query("PUMP", "ON").as_deref(), Some("true"));
        dispatcher.propagate();
        assert_eq!(dispatcher.query("PUMP", "POWERLEVEL").as_deref(), Some("8.00"));
    }

    #[test]
    fn toml_layout_builds() {
        let text = r#"
setup = ["SW.POWERSELECT SET OFF"]

[[junctions]]
name = "GEN"
kind = "feeder"
capacity = 10.0

[[junctions]]
name = "SW"
kind = "single_throw"

[[segments]]
name = "GEN-SW"
from = { junction = "GEN", side = "Right" }
to = { junction = "SW", side = "Left", offset = 2 }
"#;
        let layout: LayoutData = parse_str(text, Format::Toml, Path::new("layout.toml")).unwrap();
        let grid = build_grid(&layout, &Tuning::default(), Path::new("layout.toml")).unwrap();
        let sw = grid.junction_by_name("SW").unwrap();
        assert_eq!(sw.ports()[0].offset, 2);
        assert_eq!(layout.setup, vec!["SW.POWERSELECT SET OFF".to_string()]);
    }

    #[test]
    fn unknown_junction_reference() {
        let text = r#"{
            "junctions": [{"name": "A", "kind": "bus"}],
            "segments": [{"name": "W", "from": {"junction": "A"}, "to": {"junction": "NOPE"}}]
        }"#;
        let layout: LayoutData = parse_str(text, Format::Json, Path::new("layout.json")).unwrap();
        let err = build_grid(&layout, &Tuning::default(), Path::new("layout.json")).unwrap_err();
        assert!(matches!(
            err,
            DataLoadError::UnresolvedRef { ref name, expected_kind: "junction", .. } if name == "NOPE"
        ));
    }

    #[test]
    fn duplicate_junction_name() {
        let text = r#"{"junctions": [{"name": "A", "kind": "bus"}, {"name": "A", "kind": "selector"}]}"#;
        let layout: LayoutData = parse_str(text, Format::Json, Path::new("layout.json")).unwrap();
        let err = build_grid(&layout, &Tuning::default(), Path::new("layout.json")).unwrap_err();
        assert!(matches!(err, DataLoadError::DuplicateName { ref name, .. } if name == "A"));
    }

    #[test]
    fn feeder_needs_capacity() {
        let text = r#"{"junctions": [{"name": "GEN", "kind": "feeder"}]}"#;
        let layout: LayoutData = parse_str(text, Format::Json, Path::new("layout.json")).unwrap();
        let err = build_grid(&layout, &Tuning::default(), Path::new("layout.json")).unwrap_err();
        assert!(matches!(err, DataLoadError::Invalid { ref name, .. } if name == "GEN"));
    }

    #[test]
    fn out_of_range_capacity_is_rejected() {
        let text = r#"{"junctions": [{"name": "GEN", "kind": "feeder", "capacity": 1e12}]}"#;
        let layout: LayoutData = parse_str(text, Format::Json, Path::new("layout.json")).unwrap();
        let err = build_grid(&layout, &Tuning::default(), Path::new("layout.json")).unwrap_err();
        assert!(matches!(
            err,
            DataLoadError::Invalid { ref name, ref detail, .. }
                if name == "GEN" && detail == "capacity is out of range"
        ));

        let text = r#"{"junctions": [{"name": "PUMP", "kind": "consumer", "usage": -5e10}]}"#;
        let layout: LayoutData = parse_str(text, Format::Json, Path::new("layout.json")).unwrap();
        let err = build_grid(&layout, &Tuning::default(), Path::new("layout.json")).unwrap_err();
        assert!(matches!(err, DataLoadError::Invalid { ref name, .. } if name == "PUMP"));
    }

    #[test]
    fn non_finite_tuning_is_rejected() {
        let dir = make_test_dir("tuning_inf");
        let path = dir.join("tuning.toml");
        fs::write(&path, "[battery]\ncharge_rate = inf\n").unwrap();
        let err = load_tuning(&path).unwrap_err();
        assert!(matches!(
            err,
            DataLoadError::Invalid { ref name, ref detail, .. }
                if name == "battery.charge_rate" && detail == "out of range"
        ));
        cleanup(&dir);

        let mut tuning = Tuning::default();
        tuning.actuator.move_seconds = f64::NAN;
        let layout: LayoutData =
            parse_str(r#"{"junctions": []}"#, Format::Json, Path::new("layout.json")).unwrap();
        let err = build_grid(&layout, &tuning, Path::new("layout.json")).unwrap_err();
        assert!(matches!(err, DataLoadError::Invalid { ref name, .. } if name == "actuator.move_seconds"));
    }

    #[test]
    fn port_limit_reported() {
        let text = r#"{
            "junctions": [
                {"name": "A", "kind": "bus"},
                {"name": "B", "kind": "bus"},
                {"name": "SW", "kind": "single_throw"}
            ],
            "segments": [
                {"name": "A-SW", "from": {"junction": "A"}, "to": {"junction": "SW"}},
                {"name": "B-SW", "from": {"junction": "B"}, "to": {"junction": "SW"}}
            ]
        }"#;
        let layout: LayoutData = parse_str(text, Format::Json, Path::new("layout.json")).unwrap();
        let err = build_grid(&layout, &Tuning::default(), Path::new("layout.json")).unwrap_err();
        assert!(matches!(
            err,
            DataLoadError::PortLimit { ref segment, ref junction, .. } if segment == "B-SW" && junction == "SW"
        ));
    }

    // -----------------------------------------------------------------------
    // Directory loading
    // -----------------------------------------------------------------------

    #[test]
    fn boat_dir_applies_tuning() {
        let dir = make_test_dir("boat_dir");
        fs::write(dir.join("layout.ron"), LAYOUT_RON).unwrap();
        fs::write(dir.join("tuning.toml"), "[load]\nidle_usage = 0.5\n").unwrap();

        let mut boat = load_boat_dir(&dir).unwrap();
        propagate_power(&mut boat.grid);
        let feed = boat.grid.segment_ids()[0];
        assert_eq!(boat.grid.power_level(feed), f64_to_fixed64(0.5));

        cleanup(&dir);
    }

    #[test]
    fn boat_dir_missing_layout() {
        let dir = make_test_dir("boat_missing");
        let err = load_boat_dir(&dir).unwrap_err();
        assert!(matches!(err, DataLoadError::MissingRequired { ref file, .. } if file == "layout"));
        cleanup(&dir);
    }

    #[test]
    fn boat_dir_conflicting_formats() {
        let dir = make_test_dir("boat_conflict");
        fs::write(dir.join("layout.ron"), LAYOUT_RON).unwrap();
        fs::write(dir.join("layout.json"), "{}").unwrap();
        let err = load_boat_dir(&dir).unwrap_err();
        assert!(matches!(err, DataLoadError::ConflictingFormats { .. }));
        cleanup(&dir);
    }
}
