// src/config/validate.rs

use std::collections::HashSet;

use crate::config::model::{ConfigFile, RawConfigFile, StudyConfig};
use crate::errors::{FlowError, Result};
use crate::job::SweepValues;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = FlowError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

pub fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_work(cfg)?;
    validate_workflow_section(cfg)?;
    validate_tasks(cfg)?;
    if let Some(study) = &cfg.study {
        validate_study(study)?;
    }
    Ok(())
}

fn ensure_has_work(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() && cfg.study.is_none() {
        return Err(FlowError::Config(
            "config must contain at least one [[task]] or a [study] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_workflow_section(cfg: &RawConfigFile) -> Result<()> {
    if cfg.workflow.poll_interval_ms == 0 {
        return Err(FlowError::Config(
            "[workflow].poll_interval_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.workflow.max_cpus == Some(0) {
        return Err(FlowError::Config(
            "[workflow].max_cpus must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.manager.ncpus == 0 {
        return Err(FlowError::Config(
            "[manager].ncpus must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_tasks(cfg: &RawConfigFile) -> Result<()> {
    let mut seen: HashSet<&str> = HashSet::new();

    for (idx, task) in cfg.task.iter().enumerate() {
        if task.name.trim().is_empty() {
            return Err(FlowError::Config(format!("task #{idx} has an empty name")));
        }
        if seen.contains(task.name.as_str()) {
            return Err(FlowError::Config(format!(
                "task name '{}' is used more than once",
                task.name
            )));
        }

        if let Some(input) = task.job_spec()?.as_input() {
            input.validate()?;
        }

        for link in &task.links {
            if link.task == task.name {
                return Err(FlowError::ForwardLink {
                    task: idx,
                    producer: idx,
                });
            }
            if seen.contains(link.task.as_str()) {
                continue;
            }
            return Err(match cfg.task.iter().position(|t| t.name == link.task) {
                Some(later) => FlowError::ForwardLink {
                    task: idx,
                    producer: later,
                },
                None => FlowError::Config(format!(
                    "task '{}' links to unknown task '{}'",
                    task.name, link.task
                )),
            });
        }

        seen.insert(task.name.as_str());
    }
    Ok(())
}

fn validate_study(study: &StudyConfig) -> Result<()> {
    for (field, value) in [
        ("param", &study.param),
        ("quantity", &study.quantity),
        ("ext", &study.ext),
    ] {
        if value.trim().is_empty() {
            return Err(FlowError::Config(format!("[study].{field} must not be empty")));
        }
    }

    let [low, normal, high] = study.tolerances_mev;
    if study
        .tolerances_mev
        .iter()
        .any(|t| !t.is_finite() || *t <= 0.0)
    {
        return Err(FlowError::Config(format!(
            "[study].tolerances_mev must be positive, got {:?}",
            study.tolerances_mev
        )));
    }
    if !(low >= normal && normal >= high) {
        return Err(FlowError::Config(format!(
            "[study].tolerances_mev must be ordered low >= normal >= high, got {:?}",
            study.tolerances_mev
        )));
    }

    if study.min_points == 0 {
        return Err(FlowError::Config(
            "[study].min_points must be >= 1 (got 0)".to_string(),
        ));
    }

    match study.sweep_values()? {
        SweepValues::List(values) if values.is_empty() => {
            return Err(FlowError::Config(
                "[study].values must not be empty".to_string(),
            ));
        }
        SweepValues::Range { step, .. } if step == 0.0 || !step.is_finite() => {
            return Err(FlowError::Config(format!(
                "[study].step must be a non-zero number, got {step}"
            )));
        }
        _ => {}
    }

    if let Some(input) = study.template_spec()?.as_input() {
        input.validate()?;
    }
    Ok(())
}
