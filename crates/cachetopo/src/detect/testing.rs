use std::cell::RefCell;
use std::collections::HashMap;

use super::CommandRunner;
use crate::errors::{Result, TopologyError};

/// Canned command outputs keyed by the full command line. Unscripted commands fail.
#[derive(Default)]
pub struct ScriptedRunner {
    outputs: HashMap<String, Option<String>>,
    calls: RefCell<Vec<String>>,
}

fn key(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ok(mut self, program: &str, args: &[&str], stdout: &str) -> Self {
        self.outputs.insert(key(program, args), Some(stdout.to_string()));
        self
    }

    pub fn fail(mut self, program: &str, args: &[&str]) -> Self {
        self.outputs.insert(key(program, args), None);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<String> {
        let k = key(program, args);
        self.calls.borrow_mut().push(k.clone());
        match self.outputs.get(&k) {
            Some(Some(out)) => Ok(out.clone()),
            Some(None) => Err(TopologyError::execution(program, "exited with exit status: 1")),
            None => Err(TopologyError::execution(program, "No such file or directory")),
        }
    }
}
