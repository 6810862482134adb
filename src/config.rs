//! Simulation configuration file.
//!
//! ```text
//! 2 4 3
//! 0 p0s 0
//! 4 s3 3
//! 6 m1s 2
//! ```
//!
//! The first line is `time_slot num_cpus num_processes`; every following
//! line is `start_tick descriptor priority`. Descriptors are looked up in
//! the `proc/` directory next to the configuration file.

use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::MAX_PRIO;
use crate::error::LoadError;
use crate::loader;
use crate::os::Arrival;
use crate::process::PidAllocator;

/// One process line of the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub start_time: u64,
    pub name: String,
    pub path: PathBuf,
    pub priority: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimConfig {
    pub time_slot: u32,
    pub num_cpus: usize,
    pub processes: Vec<ProcessSpec>,
}

impl SimConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Self::parse(&content, &base.join("proc"))
    }

    /// Parse configuration text. Descriptor names are joined onto `proc_dir`.
    pub fn parse(content: &str, proc_dir: &Path) -> Result<Self, LoadError> {
        let mut lines = content
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l))
            .filter(|(_, l)| !l.trim().is_empty());

        let (line, header) = lines.next().ok_or(LoadError::Parse {
            line: 1,
            message: "empty configuration".to_string(),
        })?;
        let fields = split_fields(line, header, 3)?;
        let time_slot: u32 = number(line, fields[0], "time slot")?;
        let num_cpus: usize = number(line, fields[1], "cpu count")?;
        let num_processes: usize = number(line, fields[2], "process count")?;

        if time_slot == 0 {
            return Err(LoadError::Parse {
                line,
                message: "time slot must be at least 1".to_string(),
            });
        }
        if num_cpus == 0 {
            return Err(LoadError::Parse {
                line,
                message: "cpu count must be at least 1".to_string(),
            });
        }

        let mut processes = Vec::with_capacity(num_processes);
        for (line, text) in lines {
            let fields = split_fields(line, text, 3)?;
            let start_time: u64 = number(line, fields[0], "start tick")?;
            let name = fields[1].to_string();
            let priority: usize = number(line, fields[2], "priority")?;
            if priority >= MAX_PRIO {
                return Err(LoadError::BadPriority {
                    priority,
                    max: MAX_PRIO,
                });
            }
            processes.push(ProcessSpec {
                start_time,
                path: proc_dir.join(&name),
                name,
                priority,
            });
        }

        if processes.len() != num_processes {
            return Err(LoadError::CountMismatch {
                what: "processes",
                expected: num_processes,
                found: processes.len(),
            });
        }

        Ok(SimConfig {
            time_slot,
            num_cpus,
            processes,
        })
    }

    /// Load every descriptor, in configuration order, so pids follow the
    /// order of the file.
    pub fn load_arrivals(&self, pids: &PidAllocator) -> Result<Vec<Arrival>, LoadError> {
        self.processes
            .iter()
            .map(|spec| {
                let process = loader::load(&spec.path, pids)?.with_priority(spec.priority);
                Ok(Arrival {
                    start_time: spec.start_time,
                    name: spec.path.display().to_string(),
                    process,
                })
            })
            .collect()
    }
}

fn split_fields(line: usize, text: &str, expected: usize) -> Result<Vec<&str>, LoadError> {
    let fields: Vec<&str> = text.split_whitespace().collect();
    if fields.len() != expected {
        return Err(LoadError::Parse {
            line,
            message: format!("expected {} fields, found {}", expected, fields.len()),
        });
    }
    Ok(fields)
}

fn number<T: std::str::FromStr>(line: usize, token: &str, what: &str) -> Result<T, LoadError> {
    token.parse().map_err(|_| LoadError::Parse {
        line,
        message: format!("invalid {}: {}", what, token),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::Pid;
    use rand::Rng;

    #[test]
    fn test_parse_config() {
        let config = SimConfig::parse("2 4 3\n0 p0s 0\n4 s3 3\n6 m1s 2\n", Path::new("in/proc")).unwrap();

        assert_eq!(config.time_slot, 2);
        assert_eq!(config.num_cpus, 4);
        assert_eq!(config.processes.len(), 3);
        assert_eq!(
            config.processes[1],
            ProcessSpec {
                start_time: 4,
                name: "s3".to_string(),
                path: PathBuf::from("in/proc/s3"),
                priority: 3,
            }
        );
    }

    #[test]
    fn test_priority_out_of_range() {
        let err = SimConfig::parse("1 1 1\n0 p 5\n", Path::new("proc")).unwrap_err();
        assert!(matches!(err, LoadError::BadPriority { priority: 5, max: MAX_PRIO }));
    }

    #[test]
    fn test_process_count_mismatch() {
        let err = SimConfig::parse("1 1 2\n0 p 0\n", Path::new("proc")).unwrap_err();
        assert!(matches!(
            err,
            LoadError::CountMismatch { expected: 2, found: 1, .. }
        ));
    }

    #[test]
    fn test_zero_time_slot_and_cpus_rejected() {
        assert!(SimConfig::parse("0 1 0\n", Path::new("proc")).is_err());
        assert!(SimConfig::parse("1 0 0\n", Path::new("proc")).is_err());
    }

    #[test]
    fn test_malformed_lines() {
        assert!(SimConfig::parse("", Path::new("proc")).is_err());
        assert!(SimConfig::parse("1 1\n", Path::new("proc")).is_err());
        assert!(SimConfig::parse("1 1 1\nzero p 0\n", Path::new("proc")).is_err());
        assert!(SimConfig::parse("1 1 1\n0 p\n", Path::new("proc")).is_err());
    }

    #[test]
    fn test_files_round_trip() {
        let dir = std::env::temp_dir().join(format!("os-sim-{}", rand::thread_rng().r#gen::<u64>()));
        fs::create_dir_all(dir.join("proc")).unwrap();
        fs::write(dir.join("sched"), "3 2 2\n5 late 1\n0 early 4\n").unwrap();
        fs::write(dir.join("proc/late"), "0 1\ncalc\n").unwrap();
        fs::write(dir.join("proc/early"), "7 2\nalloc 100 0\nfree 0\n").unwrap();

        let config = SimConfig::from_file(dir.join("sched")).unwrap();
        let pids = PidAllocator::new();
        let arrivals = config.load_arrivals(&pids).unwrap();
        fs::remove_dir_all(&dir).unwrap();

        assert_eq!(arrivals.len(), 2);
        assert_eq!(arrivals[0].process.pid, Pid(1));
        assert_eq!(arrivals[0].start_time, 5);
        assert_eq!(arrivals[0].process.priority, 1);
        assert_eq!(arrivals[1].process.base_priority, 7);
        assert_eq!(arrivals[1].process.priority, 4);
        assert_eq!(arrivals[1].process.code.len(), 2);
    }

    #[test]
    fn test_bundled_inputs_run_to_completion() {
        let input = Path::new(env!("CARGO_MANIFEST_DIR")).join("input");
        for name in ["sched_0", "os_1"] {
            let config = SimConfig::from_file(input.join(name)).unwrap();
            let arrivals = config.load_arrivals(&PidAllocator::new()).unwrap();
            let count = arrivals.len();
            let options = crate::os::SimOptions {
                time_slot: config.time_slot,
                num_cpus: config.num_cpus,
                ..Default::default()
            };
            let report = crate::os::Simulation::new(options, arrivals).run();

            assert_eq!(report.finished().len(), count, "config {}", name);
            assert!(!report.deadline_hit);
        }
    }

    #[test]
    fn test_missing_descriptor() {
        let config = SimConfig::parse("1 1 1\n0 nothing 0\n", Path::new("/nonexistent/os-sim")).unwrap();
        let err = config.load_arrivals(&PidAllocator::new()).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }
}
