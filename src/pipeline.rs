//! The pipeline that serves every command: fetch-or-cache, person attribution, installment
//! expansion and filtering on the read side; validation, upsert and cache refresh on the write
//! side.
//!
//! Concurrent refreshes of one domain inside a process are single-flighted by a per-domain lock.
//! The second caller waits for the first and then finds a fresh cache.

use crate::api::{self, Mode, Sheet, SheetTab};
use crate::cache::{CacheStatusReport, Coordinator};
use crate::error::{ErrorType, IntoResult};
use crate::filters::{
    self, BudgetQuery, BudgetsView, TemplateQuery, TemplatesView, TransactionQuery,
};
use crate::installments::Expander;
use crate::model::{
    Amount, Budget, BudgetTemplate, CacheMetadata, CacheStatus, Domain, SheetRecord, Transaction,
};
use crate::person;
use crate::store::{BlobStore, DriveStore, LocalStore, MemoryStore};
use crate::validation::{self, BudgetInput, TemplateInput};
use crate::{Config, Result};
use anyhow::{anyhow, Context};
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Transactions whose destination contains this text count as income for `apply_template`.
const INCOME_DESTINATION: &str = "bank account";

const MANUAL_BUDGET: &str = "Budget already configured manually";

/// A record type with its own coordinator inside the `Pipeline`.
pub trait CachedRecord: SheetRecord {
    fn coordinator(pipeline: &Pipeline) -> &Coordinator<Self>;
}

impl CachedRecord for Transaction {
    fn coordinator(pipeline: &Pipeline) -> &Coordinator<Self> {
        &pipeline.transactions
    }
}

impl CachedRecord for Budget {
    fn coordinator(pipeline: &Pipeline) -> &Coordinator<Self> {
        &pipeline.budgets
    }
}

impl CachedRecord for BudgetTemplate {
    fn coordinator(pipeline: &Pipeline) -> &Coordinator<Self> {
        &pipeline.templates
    }
}

pub struct Pipeline {
    config: Config,
    source: Mutex<Box<dyn Sheet + Send>>,
    transactions: Coordinator<Transaction>,
    budgets: Coordinator<Budget>,
    templates: Coordinator<BudgetTemplate>,
    transactions_flight: Mutex<()>,
    budgets_flight: Mutex<()>,
    templates_flight: Mutex<()>,
    expander: Expander,
}

/// The outcome of a save: how many records were added and updated, and the saved records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveReport<R> {
    pub created: usize,
    pub updated: usize,
    pub saved: Vec<R>,
}

/// One template considered by `apply_template`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateApplication {
    pub category: String,
    pub percentage: Amount,
    pub calculated_amount: Amount,
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyTemplateReport {
    pub success: bool,
    pub total_income: Amount,
    pub templates_applied: Vec<TemplateApplication>,
    pub budgets_created: usize,
    pub message: String,
}

impl ApplyTemplateReport {
    fn failed(total_income: Amount, message: String) -> Self {
        Self {
            success: false,
            total_income,
            templates_applied: Vec::new(),
            budgets_created: 0,
            message,
        }
    }
}

impl Pipeline {
    /// Builds the pipeline for `mode`. In `Mode::Google` the OAuth tokens are loaded once and shared
    /// by the spreadsheet client and, when `drive_folder_id` is set, the remote cache folder.
    pub async fn connect(config: Config, mode: Mode) -> Result<Self> {
        let (source, remote): (Box<dyn Sheet + Send>, Option<Arc<dyn BlobStore>>) = match mode {
            Mode::Google => {
                let token = api::token_provider(&config)
                    .await
                    .pub_result(ErrorType::Auth)?;
                let remote = config.drive_folder_id().map(|folder_id| {
                    Arc::new(DriveStore::new(folder_id, token.clone())) as Arc<dyn BlobStore>
                });
                (api::sheet(&config, mode, Some(token))?, remote)
            }
            Mode::Testing => {
                let remote = config
                    .drive_folder_id()
                    .map(|_| Arc::new(MemoryStore::update_only()) as Arc<dyn BlobStore>);
                (api::sheet(&config, mode, None)?, remote)
            }
        };
        Self::new(config, source, remote)
    }

    /// Builds the pipeline over `source`, with `remote` as the first cache tier when present and
    /// the home's cache directory as the local tier.
    pub fn new(
        config: Config,
        source: Box<dyn Sheet + Send>,
        remote: Option<Arc<dyn BlobStore>>,
    ) -> Result<Self> {
        let local: Arc<dyn BlobStore> = Arc::new(LocalStore::new(config.cache_dir()));
        let policy = config.fallback_policy();
        debug!(
            remote = ?remote.as_ref().map(|r| r.describe()),
            local = %local.describe(),
            ?policy,
            "Building the pipeline"
        );
        Ok(Self {
            transactions: Coordinator::new(remote.clone(), local.clone(), policy),
            budgets: Coordinator::new(remote.clone(), local.clone(), policy),
            templates: Coordinator::new(remote, local, policy),
            transactions_flight: Mutex::new(()),
            budgets_flight: Mutex::new(()),
            templates_flight: Mutex::new(()),
            expander: Expander::new()?,
            source: Mutex::new(source),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn coordinator<R: CachedRecord>(&self) -> &Coordinator<R> {
        R::coordinator(self)
    }

    /// Returns the records of `R`, from the cache when it exists and is valid, otherwise from the
    /// sheet. Freshly fetched records are written to the cache; a failed cache write is logged
    /// and the records are still returned.
    pub async fn load<R: CachedRecord>(&self) -> Result<Vec<R>> {
        if !self.config.cache().enabled {
            debug!(domain = %R::DOMAIN, "The cache is disabled, reading the sheet");
            return self.fetch::<R>().await;
        }
        if let Some(records) = self.cached::<R>().await {
            return Ok(records);
        }

        let _flight = self.flight(R::DOMAIN).lock().await;
        if let Some(records) = self.cached::<R>().await {
            return Ok(records);
        }
        info!(domain = %R::DOMAIN, "The cache is missing or expired, reading the sheet");
        let records = self.fetch::<R>().await?;
        if rejects_empty::<R>(&records) {
            warn!(domain = %R::DOMAIN, "The sheet returned no records, the cache was not updated");
        } else if let Err(e) = self.store::<R>(&records).await {
            warn!(domain = %R::DOMAIN, "Unable to update the cache: {e:#}");
        }
        Ok(records)
    }

    /// Replaces the cached records of `R` with the current sheet contents.
    pub async fn refresh<R: CachedRecord>(&self) -> Result<CacheMetadata> {
        let _flight = self.flight(R::DOMAIN).lock().await;
        self.refresh_locked::<R>().await
    }

    pub async fn refresh_domain(&self, domain: Domain) -> Result<CacheMetadata> {
        match domain {
            Domain::Transactions => self.refresh::<Transaction>().await,
            Domain::Budgets => self.refresh::<Budget>().await,
            Domain::BudgetTemplates => self.refresh::<BudgetTemplate>().await,
        }
    }

    /// The transactions that pass `query`, attributed to people and, when `expand` is set, with
    /// installment series expanded. Filtering runs last.
    pub async fn transactions(
        &self,
        query: &TransactionQuery,
        expand: bool,
    ) -> Result<Vec<Transaction>> {
        query
            .validate(self.config.people())
            .pub_result(ErrorType::Request)?;
        let mut transactions = self.load::<Transaction>().await?;
        person::enrich(self.config.people(), &mut transactions);
        if expand {
            transactions = self.expander.expand(transactions);
        }
        Ok(query.apply(transactions))
    }

    pub async fn budgets(&self, query: &BudgetQuery) -> Result<BudgetsView> {
        let budgets = self.load::<Budget>().await?;
        Ok(BudgetsView::new(query.apply(budgets), self.config.people()))
    }

    pub async fn templates(&self, query: &TemplateQuery) -> Result<TemplatesView> {
        let templates = self.load::<BudgetTemplate>().await?;
        Ok(TemplatesView::new(query.apply(templates), self.config.people()))
    }

    /// Validates `inputs`, upserts them into the budgets tab by category, person, month and year,
    /// then refreshes the budgets cache.
    pub async fn save_budgets(&self, inputs: Vec<BudgetInput>) -> Result<SaveReport<Budget>> {
        let accepted = validation::validate_budgets(inputs, self.config.people())
            .pub_result(ErrorType::Validation)?;

        let _flight = self.flight(Domain::Budgets).lock().await;
        let tab = self.read_tab::<Budget>().await?;
        let mut budgets: Vec<Budget> = tab.records().cloned().collect();
        let mut touched = HashSet::new();
        let now = timestamp();
        let mut report = SaveReport {
            created: 0,
            updated: 0,
            saved: Vec::with_capacity(accepted.len()),
        };
        for input in accepted {
            let month = input.month.unwrap_or_default();
            let year = input.year.unwrap_or_default();
            let amount = input.amount.unwrap_or_default();
            let id = Budget::make_id(&input.category, &input.person, month, year);
            touched.insert(id.clone());
            match budgets.iter_mut().find(|b| b.id == id) {
                Some(budget) => {
                    budget.amount = amount;
                    budget.updated_at = now.clone();
                    report.updated += 1;
                    report.saved.push(budget.clone());
                }
                None => {
                    let budget = Budget {
                        id,
                        category: input.category,
                        person: input.person,
                        month,
                        year,
                        amount,
                        created_at: now.clone(),
                        updated_at: now.clone(),
                    };
                    report.created += 1;
                    report.saved.push(budget.clone());
                    budgets.push(budget);
                }
            }
        }

        budgets.retain(|b| touched.contains(&b.id));
        self.upsert_rows(&tab, &budgets, Budget::to_sheet_row).await?;
        self.refresh_after_save::<Budget>().await;
        Ok(report)
    }

    /// Validates `inputs` against the templates already in the sheet, upserts them by category
    /// and person, then refreshes the templates cache.
    pub async fn save_templates(
        &self,
        inputs: Vec<TemplateInput>,
    ) -> Result<SaveReport<BudgetTemplate>> {
        let _flight = self.flight(Domain::BudgetTemplates).lock().await;
        let tab = self.read_tab::<BudgetTemplate>().await?;
        let mut templates: Vec<BudgetTemplate> = tab.records().cloned().collect();
        let accepted = validation::validate_templates(inputs, &templates, self.config.people())
            .pub_result(ErrorType::Validation)?;

        let mut touched = HashSet::new();
        let now = timestamp();
        let mut report = SaveReport {
            created: 0,
            updated: 0,
            saved: Vec::with_capacity(accepted.len()),
        };
        for input in accepted {
            let active = input.is_active();
            let percentage = input.percentage.unwrap_or_default();
            let id = BudgetTemplate::make_id(&input.category, &input.person);
            touched.insert(id.clone());
            match templates.iter_mut().find(|t| t.id == id) {
                Some(template) => {
                    template.percentage = percentage;
                    template.active = active;
                    template.updated_at = now.clone();
                    report.updated += 1;
                    report.saved.push(template.clone());
                }
                None => {
                    let template = BudgetTemplate {
                        id,
                        category: input.category,
                        person: input.person,
                        percentage,
                        active,
                        created_at: now.clone(),
                        updated_at: now.clone(),
                    };
                    report.created += 1;
                    report.saved.push(template.clone());
                    templates.push(template);
                }
            }
        }

        templates.retain(|t| touched.contains(&t.id));
        self.upsert_rows(&tab, &templates, BudgetTemplate::to_sheet_row).await?;
        self.refresh_after_save::<BudgetTemplate>().await;
        Ok(report)
    }

    /// Creates the budgets of `person` for one month from their active templates. Income is the
    /// sum of the month's transactions into a bank account. Categories that already have a budget
    /// for the month are left alone.
    pub async fn apply_template(
        &self,
        person: &str,
        month: u32,
        year: i32,
    ) -> Result<ApplyTemplateReport> {
        let name = person::find(self.config.people(), person)
            .map(|p| p.name.clone())
            .ok_or_else(|| anyhow!("'{person}' is not a configured person"))
            .pub_result(ErrorType::Request)?;
        let query = filters::month_query(&name, year, month)
            .with_context(|| format!("{month}/{year} is not a valid month"))
            .pub_result(ErrorType::Request)?;

        let transactions = self.transactions(&query, true).await?;
        let income = transactions
            .iter()
            .filter(|t| t.destination.to_lowercase().contains(INCOME_DESTINATION))
            .fold(Amount::ZERO, |sum, t| sum + t.amount);
        if income.value() <= Decimal::ZERO {
            return Ok(ApplyTemplateReport::failed(
                Amount::ZERO,
                format!("No income found for {name} in {month:02}/{year}"),
            ));
        }

        let templates: Vec<BudgetTemplate> = self
            .load::<BudgetTemplate>()
            .await?
            .into_iter()
            .filter(|t| t.active && t.person.eq_ignore_ascii_case(&name))
            .collect();
        if templates.is_empty() {
            return Ok(ApplyTemplateReport::failed(
                income,
                format!("{name} has no active budget templates"),
            ));
        }

        let configured: HashSet<String> = self
            .load::<Budget>()
            .await?
            .into_iter()
            .filter(|b| b.person.eq_ignore_ascii_case(&name) && b.month == month && b.year == year)
            .map(|b| b.category.to_lowercase())
            .collect();

        let mut applied = Vec::with_capacity(templates.len());
        let mut inputs = Vec::new();
        for template in templates {
            let calculated = Amount::from(
                (income.value() * template.percentage.value() / Decimal::ONE_HUNDRED)
                    .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
            );
            let skip = configured.contains(&template.category.to_lowercase());
            if !skip {
                inputs.push(BudgetInput {
                    category: template.category.clone(),
                    person: name.clone(),
                    month: Some(month),
                    year: Some(year),
                    amount: Some(calculated),
                });
            }
            applied.push(TemplateApplication {
                category: template.category,
                percentage: template.percentage,
                calculated_amount: calculated,
                applied: !skip,
                reason: skip.then(|| MANUAL_BUDGET.to_string()),
            });
        }

        let budgets_created = inputs.len();
        if budgets_created > 0 {
            self.save_budgets(inputs).await?;
        }
        info!(person = %name, month, year, budgets_created, "Applied budget templates");
        Ok(ApplyTemplateReport {
            success: true,
            total_income: income,
            message: format!(
                "Created {budgets_created} budget(s) for {name} in {month:02}/{year} from {} template(s)",
                applied.len()
            ),
            templates_applied: applied,
            budgets_created,
        })
    }

    /// The cache status of every domain as of `now`.
    pub async fn status(&self, now: DateTime<Utc>) -> Vec<CacheStatusReport> {
        let auto_refresh = self.config.cache().auto_refresh;
        let source_id = self.config.spreadsheet_id();
        vec![
            self.transactions.status_at(now, auto_refresh, source_id).await,
            self.budgets.status_at(now, auto_refresh, source_id).await,
            self.templates.status_at(now, auto_refresh, source_id).await,
        ]
    }

    /// Clears the cache of `domain`, or of every domain.
    pub async fn clear(&self, domain: Option<Domain>) {
        for domain in domain.map_or(Domain::ALL.to_vec(), |d| vec![d]) {
            match domain {
                Domain::Transactions => self.transactions.clear().await,
                Domain::Budgets => self.budgets.clear().await,
                Domain::BudgetTemplates => self.templates.clear().await,
            }
        }
    }

    /// Creates the blobs that the remote cache folder is missing. Returns the created names.
    pub async fn init_remote(&self) -> Result<Vec<String>> {
        if self.config.drive_folder_id().is_none() {
            return Err(anyhow!(
                "No drive_folder_id is configured in {}",
                self.config.config_path().display()
            )
            .context(ErrorType::Config));
        }
        let source_id = self.config.spreadsheet_id();
        let mut created = self
            .transactions
            .init_remote(source_id)
            .await
            .pub_result(ErrorType::Cache)?;
        created.extend(
            self.budgets
                .init_remote(source_id)
                .await
                .pub_result(ErrorType::Cache)?,
        );
        created.extend(
            self.templates
                .init_remote(source_id)
                .await
                .pub_result(ErrorType::Cache)?,
        );
        Ok(created)
    }

    fn flight(&self, domain: Domain) -> &Mutex<()> {
        match domain {
            Domain::Transactions => &self.transactions_flight,
            Domain::Budgets => &self.budgets_flight,
            Domain::BudgetTemplates => &self.templates_flight,
        }
    }

    /// The cached records when the cache exists and is valid.
    async fn cached<R: CachedRecord>(&self) -> Option<Vec<R>> {
        let coordinator = R::coordinator(self);
        if coordinator.exists().await && coordinator.is_valid().await {
            debug!(domain = %R::DOMAIN, "Serving from the cache");
            Some(coordinator.read().await)
        } else {
            None
        }
    }

    /// Refreshes the cache of `R`. The caller holds the domain's flight lock.
    async fn refresh_locked<R: CachedRecord>(&self) -> Result<CacheMetadata> {
        let records = self.fetch::<R>().await?;
        if rejects_empty::<R>(&records) {
            return Err(anyhow!(
                "The sheet returned no {}, the cache was left untouched",
                R::DOMAIN
            )
            .context(ErrorType::Source));
        }
        let metadata = self.store::<R>(&records).await.pub_result(ErrorType::Cache)?;
        info!(domain = %R::DOMAIN, count = records.len(), "Refreshed the cache");
        Ok(metadata)
    }

    async fn refresh_after_save<R: CachedRecord>(&self) {
        if !self.config.cache().enabled {
            return;
        }
        if let Err(e) = self.refresh_locked::<R>().await {
            warn!(domain = %R::DOMAIN, "Saved to the sheet but unable to refresh the cache: {e:#}");
        }
    }

    async fn fetch<R: CachedRecord>(&self) -> Result<Vec<R>> {
        let range = self.config.sheet_range(R::DOMAIN);
        let mut sheet = self.source.lock().await;
        api::fetch::<R>(sheet.as_mut(), &range)
            .await
            .pub_result(ErrorType::Source)
    }

    async fn store<R: CachedRecord>(&self, records: &[R]) -> Result<CacheMetadata> {
        let coordinator = R::coordinator(self);
        coordinator.write(records).await?;
        coordinator
            .refresh_metadata(
                records.len() as u64,
                CacheStatus::Fresh,
                self.config.spreadsheet_id(),
                self.config.cache().ttl_minutes,
            )
            .await
    }

    /// Reads the tab of `R` with the position of each row.
    async fn read_tab<R: SheetRecord>(&self) -> Result<SheetTab<R>> {
        let range = self.config.sheet_range(R::DOMAIN);
        let mut sheet = self.source.lock().await;
        SheetTab::read(sheet.as_mut(), &range)
            .await
            .pub_result(ErrorType::Source)
    }

    /// Writes `records` over their rows in `tab` and appends the rest, creating the tab first
    /// when it does not exist. Nothing is cleared, so a failed write leaves the rows as they were.
    async fn upsert_rows<R: SheetRecord>(
        &self,
        tab: &SheetTab<R>,
        records: &[R],
        to_row: impl Fn(&R) -> Vec<String>,
    ) -> Result<()> {
        let ranges = tab.upsert_ranges(records, to_row);
        let mut sheet = self.source.lock().await;
        if !tab.exists() {
            let title = tab
                .title()
                .with_context(|| format!("'{}' does not name a tab", tab.range()))
                .pub_result(ErrorType::Source)?;
            sheet.add_sheet(title).await.pub_result(ErrorType::Source)?;
            info!(domain = %R::DOMAIN, "Created the '{title}' tab");
        }
        sheet
            .write_ranges(&ranges)
            .await
            .pub_result(ErrorType::Source)?;
        info!(domain = %R::DOMAIN, count = records.len(), "Saved to '{}'", tab.range());
        Ok(())
    }
}

/// An empty transactions fetch means a broken source, never an empty ledger.
fn rejects_empty<R: SheetRecord>(records: &[R]) -> bool {
    R::DOMAIN == Domain::Transactions && records.is_empty()
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
