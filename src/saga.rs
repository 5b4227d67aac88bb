//! Multi-statement table operations with compensation.
//!
//! QuestDB has no transactions across DDL statements, so replacing or renaming
//! a table runs as a sequence of steps. When a step fails (or the user
//! interrupts) the steps already taken are undone in reverse. Whatever cannot
//! be undone is reported so the operator can clean up.

use std::fmt;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::client::{ExecOptions, QuestDb};
use crate::error::QdbError;
use crate::interrupt::Interrupt;
use crate::sql::{self, CreateTableAs, PartitionBy};

/// What to do with a table that is about to be replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginalPolicy {
    /// Rename it aside. `None` picks a unique generated name.
    Backup { name: Option<String> },
    /// Drop it. Its data is gone once the drop succeeds.
    Drop,
}

impl Default for OriginalPolicy {
    fn default() -> Self {
        OriginalPolicy::Backup { name: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaStep {
    CreateTemp,
    CheckSource,
    CheckTarget,
    DropOriginal,
    CheckBackup,
    BackupOriginal,
    RenameFinal,
}

impl fmt::Display for SagaStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SagaStep::CreateTemp => "create temporary table",
            SagaStep::CheckSource => "check source table",
            SagaStep::CheckTarget => "check target table",
            SagaStep::DropOriginal => "drop original table",
            SagaStep::CheckBackup => "check backup table",
            SagaStep::BackupOriginal => "back up original table",
            SagaStep::RenameFinal => "rename into place",
        };
        f.write_str(s)
    }
}

/// Tables the saga has touched so far. Drives compensation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SagaState {
    pub target_table: String,
    pub temp_table_name: Option<String>,
    pub backup_table_name: Option<String>,
    pub temp_table_created: bool,
    pub backup_created: bool,
    pub original_dropped_no_backup: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Recovery {
    /// Every completed step was undone.
    Clean,
    /// Leftovers that need manual attention.
    Degraded { warnings: Vec<String> },
}

#[derive(Debug)]
pub struct SagaFailure {
    pub step: SagaStep,
    pub cause: QdbError,
    pub recovery: Recovery,
    pub state: SagaState,
}

impl fmt::Display for SagaFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.step, self.cause)?;
        match &self.recovery {
            Recovery::Clean => write!(f, "; rolled back cleanly"),
            Recovery::Degraded { warnings } => {
                write!(f, "; manual cleanup required:")?;
                for warning in warnings {
                    write!(f, "\n  - {warning}")?;
                }
                Ok(())
            }
        }
    }
}

/// Where the data that lived under the target name ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OriginalData {
    /// There was no table under that name.
    Absent,
    BackedUp { table: String },
    Dropped,
}

#[derive(Debug, Clone)]
pub struct ReplaceRequest {
    pub target: String,
    pub query: String,
    pub timestamp: Option<String>,
    pub partition_by: Option<PartitionBy>,
    pub upsert_keys: Vec<String>,
    pub original: OriginalPolicy,
    pub exec_options: ExecOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplaceReport {
    pub target_table: String,
    pub temp_table: String,
    pub original: OriginalData,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub upsert_keys: Vec<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct RenameRequest {
    pub old_name: String,
    pub new_name: String,
    /// Applied when `new_name` already exists.
    pub existing: OriginalPolicy,
    pub exec_options: ExecOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenameReport {
    pub old_name: String,
    pub new_name: String,
    /// What happened to a table that already had the new name.
    pub replaced: OriginalData,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub dry_run: bool,
}

struct Saga<'a, Q> {
    db: &'a Q,
    interrupt: &'a Interrupt,
    options: &'a ExecOptions,
    state: SagaState,
}

impl<'a, Q: QuestDb> Saga<'a, Q> {
    fn new(db: &'a Q, interrupt: &'a Interrupt, options: &'a ExecOptions, target: &str) -> Self {
        Self {
            db,
            interrupt,
            options,
            state: SagaState {
                target_table: target.to_string(),
                ..SagaState::default()
            },
        }
    }

    /// Forward step: honours the interrupt flag first.
    async fn execute(&self, step: SagaStep, statement: &str) -> Result<(), QdbError> {
        self.interrupt.check()?;
        info!("{}: {}", step, statement);
        self.db.exec(statement, self.options).await.map(|_| ())
    }

    async fn exists(&self, table: &str) -> Result<bool, QdbError> {
        self.interrupt.check()?;
        self.db.table_exists(table).await
    }

    /// Compensation statement: runs even after an interrupt.
    async fn compensate(&self, statement: &str) -> Result<(), QdbError> {
        info!("rollback: {}", statement);
        self.db.exec(statement, self.options).await.map(|_| ())
    }

    /// Undo completed steps in reverse and wrap the cause.
    async fn fail(mut self, step: SagaStep, cause: QdbError) -> QdbError {
        error!("{} failed: {}", step, cause);
        let warnings = {
            let _shield = self.interrupt.shield();
            self.rollback().await
        };
        let recovery = if warnings.is_empty() {
            Recovery::Clean
        } else {
            for warning in &warnings {
                warn!("{warning}");
            }
            Recovery::Degraded { warnings }
        };
        QdbError::Saga(Box::new(SagaFailure {
            step,
            cause,
            recovery,
            state: self.state,
        }))
    }

    /// Restore the backup, then drop the temporary table. When the original
    /// was dropped without a backup the temporary table is kept on purpose:
    /// it holds the only copy of the data.
    async fn rollback(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();
        let target = self.state.target_table.clone();

        if self.state.backup_created
            && let Some(backup) = self.state.backup_table_name.clone()
        {
            match self.compensate(&sql::rename_table(&backup, &target)).await {
                Ok(()) => {
                    info!("restored '{}' from backup '{}'", target, backup);
                    self.state.backup_created = false;
                }
                Err(e) => warnings.push(format!(
                    "original data is still in backup table '{backup}' ({e}); restore it with: {}",
                    sql::rename_table(&backup, &target)
                )),
            }
        }

        if self.state.temp_table_created
            && let Some(temp) = self.state.temp_table_name.clone()
        {
            if self.state.original_dropped_no_backup {
                warnings.push(format!(
                    "'{target}' was dropped without a backup; the new data is kept in '{temp}'"
                ));
            } else {
                match self.compensate(&sql::drop_table(&temp)).await {
                    Ok(()) => self.state.temp_table_created = false,
                    Err(e) => warnings.push(format!(
                        "temporary table '{temp}' could not be dropped ({e}); drop it manually"
                    )),
                }
            }
        } else if self.state.original_dropped_no_backup {
            warnings.push(format!(
                "'{target}' was dropped without a backup and cannot be restored"
            ));
        }

        warnings
    }
}

fn require_name(kind: &str, name: &str) -> Result<(), QdbError> {
    if name.trim().is_empty() {
        Err(QdbError::precondition(format!("{kind} must not be empty")))
    } else {
        Ok(())
    }
}

fn check_backup_name(policy: &OriginalPolicy, protected: &[&str]) -> Result<(), QdbError> {
    if let OriginalPolicy::Backup { name: Some(backup) } = policy {
        require_name("backup table name", backup)?;
        if protected.iter().any(|t| t.eq_ignore_ascii_case(backup)) {
            return Err(QdbError::precondition(format!(
                "backup table name '{backup}' clashes with a table taking part in the operation"
            )));
        }
    }
    Ok(())
}

/// Make `target` hold the result of `query`, atomically from the reader's
/// point of view.
///
/// The result is materialised into a temporary table first; the existing
/// table is then backed up (or dropped) and the temporary table renamed into
/// place.
pub async fn create_or_replace_table<Q: QuestDb>(
    db: &Q,
    request: &ReplaceRequest,
    interrupt: &Interrupt,
) -> Result<ReplaceReport, QdbError> {
    require_name("target table name", &request.target)?;
    if request.query.trim().is_empty() {
        return Err(QdbError::precondition("query must not be empty"));
    }
    sql::check_upsert_keys(request.timestamp.as_deref(), &request.upsert_keys)?;
    check_backup_name(&request.original, &[&request.target])?;

    let target = request.target.as_str();
    let temp = sql::temp_table_name(target);
    let mut saga = Saga::new(db, interrupt, &request.exec_options, target);
    saga.state.temp_table_name = Some(temp.clone());

    let create = sql::create_table_as(&CreateTableAs {
        table: &temp,
        query: &request.query,
        timestamp: request.timestamp.as_deref(),
        partition_by: request.partition_by,
        upsert_keys: &request.upsert_keys,
    });
    if let Err(cause) = saga.execute(SagaStep::CreateTemp, &create).await {
        return Err(saga.fail(SagaStep::CreateTemp, cause).await);
    }
    saga.state.temp_table_created = true;

    let original = match saga.exists(target).await {
        Err(cause) => return Err(saga.fail(SagaStep::CheckTarget, cause).await),
        Ok(false) => OriginalData::Absent,
        Ok(true) => match set_aside(&mut saga, &request.original).await {
            Ok(original) => original,
            Err((step, cause)) => return Err(saga.fail(step, cause).await),
        },
    };

    let rename = sql::rename_table(&temp, target);
    if let Err(cause) = saga.execute(SagaStep::RenameFinal, &rename).await {
        return Err(saga.fail(SagaStep::RenameFinal, cause).await);
    }

    info!("'{}' now holds the query result", target);
    Ok(ReplaceReport {
        target_table: target.to_string(),
        temp_table: temp,
        original,
        upsert_keys: request.upsert_keys.clone(),
        dry_run: db.is_dry_run(),
    })
}

/// Rename `old_name` to `new_name`, backing up or dropping a table that
/// already has the new name.
pub async fn rename_table<Q: QuestDb>(
    db: &Q,
    request: &RenameRequest,
    interrupt: &Interrupt,
) -> Result<RenameReport, QdbError> {
    require_name("old table name", &request.old_name)?;
    require_name("new table name", &request.new_name)?;
    if request.old_name.eq_ignore_ascii_case(&request.new_name) {
        return Err(QdbError::precondition(format!(
            "old and new table names are the same ('{}')",
            request.old_name
        )));
    }
    check_backup_name(&request.existing, &[&request.old_name, &request.new_name])?;

    let mut saga = Saga::new(db, interrupt, &request.exec_options, &request.new_name);

    match saga.exists(&request.old_name).await {
        Ok(true) => {}
        Ok(false) => {
            let cause = QdbError::TableNotFound {
                table: Some(request.old_name.clone()),
                message: format!("table '{}' does not exist", request.old_name),
            };
            return Err(saga.fail(SagaStep::CheckSource, cause).await);
        }
        Err(cause) => return Err(saga.fail(SagaStep::CheckSource, cause).await),
    }

    let replaced = match saga.exists(&request.new_name).await {
        Err(cause) => return Err(saga.fail(SagaStep::CheckTarget, cause).await),
        Ok(false) => OriginalData::Absent,
        Ok(true) => match set_aside(&mut saga, &request.existing).await {
            Ok(original) => original,
            Err((step, cause)) => return Err(saga.fail(step, cause).await),
        },
    };

    let rename = sql::rename_table(&request.old_name, &request.new_name);
    if let Err(cause) = saga.execute(SagaStep::RenameFinal, &rename).await {
        return Err(saga.fail(SagaStep::RenameFinal, cause).await);
    }

    info!("renamed '{}' to '{}'", request.old_name, request.new_name);
    Ok(RenameReport {
        old_name: request.old_name.clone(),
        new_name: request.new_name.clone(),
        replaced,
        dry_run: db.is_dry_run(),
    })
}

/// Move the table currently under the saga's target name out of the way.
async fn set_aside<Q: QuestDb>(
    saga: &mut Saga<'_, Q>,
    policy: &OriginalPolicy,
) -> Result<OriginalData, (SagaStep, QdbError)> {
    let target = saga.state.target_table.clone();
    match policy {
        OriginalPolicy::Drop => {
            saga.execute(SagaStep::DropOriginal, &sql::drop_table(&target))
                .await
                .map_err(|e| (SagaStep::DropOriginal, e))?;
            saga.state.original_dropped_no_backup = true;
            warn!("dropped '{}' without a backup", target);
            Ok(OriginalData::Dropped)
        }
        OriginalPolicy::Backup { name } => {
            let backup = name
                .clone()
                .unwrap_or_else(|| sql::backup_table_name(&target));
            saga.state.backup_table_name = Some(backup.clone());

            let taken = saga
                .exists(&backup)
                .await
                .map_err(|e| (SagaStep::CheckBackup, e))?;
            if taken {
                return Err((
                    SagaStep::CheckBackup,
                    QdbError::precondition(format!("backup table '{backup}' already exists")),
                ));
            }

            saga.execute(SagaStep::BackupOriginal, &sql::rename_table(&target, &backup))
                .await
                .map_err(|e| (SagaStep::BackupOriginal, e))?;
            saga.state.backup_created = true;
            info!("backed up '{}' as '{}'", target, backup);
            Ok(OriginalData::BackedUp { table: backup })
        }
    }
}
