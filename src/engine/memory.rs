// memory.rs - In-memory MediaEngine with scripted command outcomes

use super::{check_name, MediaEngine};
use crate::error::EngineError;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

type Script = Box<dyn Fn(&[String]) -> Result<Vec<u8>, String> + Send + Sync>;

/// Runs no real commands. The script decides each outcome; on success its
/// bytes are written to the command's last argument.
pub struct MemoryEngine {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    calls: Mutex<Vec<Vec<String>>>,
    script: Script,
    partial_on_failure: bool,
    busy: AtomicBool,
}

impl MemoryEngine {
    pub fn new(script: impl Fn(&[String]) -> Result<Vec<u8>, String> + Send + Sync + 'static) -> Self {
        Self {
            files: Mutex::new(BTreeMap::new()),
            calls: Mutex::new(Vec::new()),
            script: Box::new(script),
            partial_on_failure: false,
            busy: AtomicBool::new(false),
        }
    }

    /// Every command succeeds with the same fixed output bytes.
    pub fn succeeding() -> Self {
        Self::new(|_| Ok(b"converted".to_vec()))
    }

    /// Failed commands leave a truncated output file behind, like a real encoder.
    pub fn leaving_partial_output(mut self) -> Self {
        self.partial_on_failure = true;
        self
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

fn staged_inputs(args: &[String]) -> Vec<&str> {
    args.windows(2)
        .filter(|w| w[0] == "-i" && !w[1].contains('='))
        .map(|w| w[1].as_str())
        .collect()
}

impl MediaEngine for MemoryEngine {
    fn stage(&self, name: &str, bytes: &[u8]) -> Result<(), EngineError> {
        check_name(name)?;
        self.files.lock().unwrap().insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    fn run(&self, args: &[String]) -> Result<(), EngineError> {
        assert!(
            !self.busy.swap(true, Ordering::SeqCst),
            "a second command was issued before the first finished"
        );
        self.calls.lock().unwrap().push(args.to_vec());

        let outcome = (|| {
            let output = args
                .last()
                .ok_or_else(|| EngineError::Processing("no output name".into()))?;
            for input in staged_inputs(args) {
                if !self.files.lock().unwrap().contains_key(input) {
                    return Err(EngineError::Processing(format!("{input}: No such file or directory")));
                }
            }
            match (self.script)(args) {
                Ok(bytes) => {
                    self.stage(output, &bytes)?;
                    Ok(())
                }
                Err(reason) => {
                    if self.partial_on_failure {
                        self.stage(output, b"partial")?;
                    }
                    Err(EngineError::Processing(reason))
                }
            }
        })();

        self.busy.store(false, Ordering::SeqCst);
        outcome
    }

    fn retrieve(&self, name: &str) -> Result<Vec<u8>, EngineError> {
        self.files
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(name.to_string()))
    }

    fn release(&self, name: &str) -> Result<(), EngineError> {
        check_name(name)?;
        self.files.lock().unwrap().remove(name);
        Ok(())
    }

    fn staged_names(&self) -> Result<Vec<String>, EngineError> {
        Ok(self.files.lock().unwrap().keys().cloned().collect())
    }
}
