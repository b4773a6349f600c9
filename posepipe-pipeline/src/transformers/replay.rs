//! Replays keypoint sets captured by the keypoint recorder

use crate::param::{ParamSpec, ParamValue};
use crate::registry::{BuildContext, KindInfo};
use crate::transformer::{Flow, PassContext, Role, Transformer, TransformerBase};
use posepipe_core::{meta, Error, FrameData, GlobalProps, KeypointRecord, KeypointSet, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::sync::Arc;
use tracing::info;

pub const KIND: &str = "keypoint_replay";

pub struct KeypointReplay {
    base: TransformerBase,
    props: GlobalProps,
    path: String,
    terminate_at_end: bool,
    sets: Vec<Arc<KeypointSet>>,
    cursor: usize,
}

impl KeypointReplay {
    pub fn new(props: GlobalProps) -> Self {
        Self {
            base: TransformerBase::new(KIND, "Keypoint Replay"),
            props,
            path: String::new(),
            terminate_at_end: true,
            sets: Vec::new(),
            cursor: 0,
        }
    }

    pub fn info() -> KindInfo {
        KindInfo {
            kind: KIND,
            description: "Replays a keypoint recording, one set per pass",
            role: Role::Source,
            parameters: Self::param_specs(),
        }
    }

    pub fn create(ctx: &BuildContext) -> Result<Box<dyn Transformer>> {
        Ok(Box::new(Self::new(ctx.props.clone())))
    }

    fn param_specs() -> Vec<ParamSpec> {
        vec![
            ParamSpec::text("path", "Recording written by keypoint_recorder"),
            ParamSpec::bool("terminate_at_end", "End the stream after the last set instead of looping"),
        ]
    }
}

fn load(path: &std::path::Path) -> Result<Vec<Arc<KeypointSet>>> {
    let file = File::open(path)
        .map_err(|e| Error::resource(format!("Cannot open recording {:?}: {}", path, e)))?;
    let mut sets = Vec::new();
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: KeypointRecord = serde_json::from_str(&line).map_err(|e| {
            Error::resource(format!("{:?} line {}: {}", path, number + 1, e))
        })?;
        sets.push(Arc::new(KeypointSet::from_record(record)?));
    }
    Ok(sets)
}

impl Transformer for KeypointReplay {
    fn base(&self) -> &TransformerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut TransformerBase {
        &mut self.base
    }

    fn role(&self) -> Role {
        Role::Source
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        Self::param_specs()
    }

    fn get_parameter(&self, name: &str) -> Option<ParamValue> {
        match name {
            "path" => Some(self.path.clone().into()),
            "terminate_at_end" => Some(self.terminate_at_end.into()),
            _ => None,
        }
    }

    fn apply_parameter(&mut self, name: &str, value: ParamValue) -> Result<()> {
        match (name, value) {
            ("path", ParamValue::Text(path)) => self.path = path,
            ("terminate_at_end", ParamValue::Bool(b)) => self.terminate_at_end = b,
            (name, value) => {
                return Err(Error::config(format!(
                    "Cannot set '{}' to {} on '{}'",
                    name,
                    value,
                    self.name()
                )))
            }
        }
        Ok(())
    }

    fn open(&mut self) -> Result<()> {
        if self.path.is_empty() {
            return Err(Error::config("Keypoint replay needs a recording path"));
        }
        let path = self.props.resolve(&self.path);
        self.sets = load(&path)?;
        self.cursor = 0;
        info!("Loaded {} keypoint sets from {:?}", self.sets.len(), path);
        Ok(())
    }

    fn close(&mut self) {
        self.sets.clear();
        self.cursor = 0;
    }

    fn transform(&mut self, mut frame: FrameData, _ctx: &PassContext) -> Result<Flow> {
        if self.cursor >= self.sets.len() {
            if self.terminate_at_end || self.sets.is_empty() {
                return Ok(Flow::Terminate);
            }
            self.cursor = 0;
        }
        frame.keypoints = Some(self.sets[self.cursor].clone());
        if !frame.metadata.contains(meta::FRAME_INDEX) {
            frame.metadata.insert(meta::FRAME_INDEX, self.cursor as u64);
        }
        self.cursor += 1;
        Ok(Flow::Continue(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use posepipe_core::{Keypoint, SkeletonTopology};
    use std::io::Write;

    fn write_recording(dir: &std::path::Path, count: usize) {
        let mut file = File::create(dir.join("take.jsonl")).unwrap();
        for i in 0..count {
            let mut points = vec![Keypoint::default(); 17];
            points[0] = Keypoint::new(i as f32 / 10.0, 0.5, 0.0, 1.0);
            let set = KeypointSet::new(points, SkeletonTopology::move_net()).unwrap();
            writeln!(file, "{}", serde_json::to_string(&set.to_record()).unwrap()).unwrap();
        }
    }

    fn replay(dir: &std::path::Path) -> KeypointReplay {
        let mut replay = KeypointReplay::new(GlobalProps::with_working_dir(dir));
        replay.set_parameter("path", "take.jsonl".into()).unwrap();
        replay
    }

    #[test]
    fn test_replays_in_order_then_terminates() {
        let dir = tempfile::tempdir().unwrap();
        write_recording(dir.path(), 2);
        let mut replay = replay(dir.path());
        replay.open().unwrap();

        let ctx = PassContext::default();
        for expected in [0.0, 0.1] {
            let frame = replay.transform(FrameData::new(), &ctx).unwrap().into_frame().unwrap();
            let y = frame.keypoints.unwrap().get(0).unwrap().y;
            assert!((y - expected).abs() < 1e-6);
        }
        assert!(replay.transform(FrameData::new(), &ctx).unwrap().is_terminate());
    }

    #[test]
    fn test_loops_when_asked() {
        let dir = tempfile::tempdir().unwrap();
        write_recording(dir.path(), 1);
        let mut replay = replay(dir.path());
        replay.set_parameter("terminate_at_end", false.into()).unwrap();
        replay.open().unwrap();

        let ctx = PassContext::default();
        for _ in 0..3 {
            assert!(!replay.transform(FrameData::new(), &ctx).unwrap().is_terminate());
        }
    }

    #[test]
    fn test_missing_recording_is_resource_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = replay(dir.path()).open().unwrap_err();
        assert_eq!(err.kind(), posepipe_core::ErrorKind::Resource);
    }

    #[test]
    fn test_corrupt_line_reports_line_number() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("take.jsonl"), "{\"topology\":\"move_net\"\n").unwrap();
        let err = replay(dir.path()).open().unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }
}
