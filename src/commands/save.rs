//! Write commands: saving budgets and budget templates from JSON files, and creating a month's
//! budgets from templates.

use crate::api::Mode;
use crate::args::ApplyTemplateArgs;
use crate::commands::Out;
use crate::error::{ErrorType, IntoResult};
use crate::model::{Budget, BudgetTemplate};
use crate::pipeline::{ApplyTemplateReport, Pipeline, SaveReport};
use crate::validation::{self, BudgetInput, TemplateInput};
use crate::{utils, Config, Result};
use anyhow::Context;
use serde::de::DeserializeOwned;
use std::path::Path;

pub async fn save_budgets(config: Config, mode: Mode, file: &Path) -> Result<Out<SaveReport<Budget>>> {
    let inputs: Vec<BudgetInput> = read_request(file).await?;
    let pipeline = Pipeline::connect(config, mode).await?;
    let report = pipeline.save_budgets(inputs).await?;
    Ok(Out::new(
        format!(
            "Saved budgets: {} created, {} updated",
            report.created, report.updated
        ),
        report,
    ))
}

pub async fn save_templates(
    config: Config,
    mode: Mode,
    file: &Path,
) -> Result<Out<SaveReport<BudgetTemplate>>> {
    let inputs: Vec<TemplateInput> = read_request(file).await?;
    let pipeline = Pipeline::connect(config, mode).await?;
    let report = pipeline.save_templates(inputs).await?;
    Ok(Out::new(
        format!(
            "Saved budget templates: {} created, {} updated",
            report.created, report.updated
        ),
        report,
    ))
}

pub async fn apply_template(
    config: Config,
    mode: Mode,
    args: &ApplyTemplateArgs,
) -> Result<Out<ApplyTemplateReport>> {
    let pipeline = Pipeline::connect(config, mode).await?;
    let report = pipeline
        .apply_template(args.person(), args.month(), args.year())
        .await?;
    Ok(Out::new(report.message.clone(), report))
}

async fn read_request<T: DeserializeOwned>(file: &Path) -> Result<Vec<T>> {
    let json = utils::read(file).await.pub_result(ErrorType::Request)?;
    validation::parse_request(&json)
        .with_context(|| format!("Unable to parse '{}'", file.display()))
        .pub_result(ErrorType::Request)
}
