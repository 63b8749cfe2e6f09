use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use wms_core::{
    Aggregate, BinId, DomainError, Entity, OrderLineId, PickListId, PickTaskId,
};
use wms_orders::Order;
use wms_picking::{
    CreatePickList, FinishPickList, MarkTaskPicked, PickList, PickListCommand, PickListEvent,
    PickListStatus, PickTask, PickTaskStatus, StartPickList, TaskSource,
};

use crate::audit::AuditTrail;
use crate::error::{ServiceError, ServiceResult};
use crate::store::{StoreTx, WarehouseStore, constraints};

/// Read-only projection of a picklist with human-readable labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PickListView {
    pub id: PickListId,
    pub order_number: String,
    pub status: PickListStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub done_at: Option<DateTime<Utc>>,
    pub tasks: Vec<PickTaskView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PickTaskView {
    pub id: PickTaskId,
    pub line_no: Option<u32>,
    pub sku: Option<String>,
    pub item_name: Option<String>,
    pub location_code: Option<String>,
    pub quantity: i64,
    pub status: PickTaskStatus,
    pub picked_at: Option<DateTime<Utc>>,
    /// `None` when no bin could be resolved.
    pub bin_code: Option<String>,
}

/// Picking workflow over posted orders.
#[derive(Clone)]
pub struct PickingService {
    store: Arc<dyn WarehouseStore>,
    audit: Option<AuditTrail>,
}

impl PickingService {
    pub fn new(store: Arc<dyn WarehouseStore>) -> Self {
        Self { store, audit: None }
    }

    pub fn with_audit(mut self, audit: AuditTrail) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Create the picklist of a POSTED order with one OPEN task per line.
    ///
    /// Bins are suggested on a best-effort basis and resolved in a separate
    /// read, so a failed lookup never aborts the creating transaction.
    #[instrument(skip(self), err)]
    pub async fn create_picklist(&self, order_number: &str) -> ServiceResult<PickList> {
        let number = DomainError::require_identifier("order number", order_number)?;
        let candidates = self.bin_candidates(number).await;

        let mut tx = self.store.begin().await?;
        let order = tx
            .order_by_number_for_update(number)
            .await?
            .ok_or_else(|| DomainError::not_found(Order::KIND, number))?;

        let sources = order
            .lines()
            .iter()
            .map(|line| TaskSource {
                order_line_id: line.id,
                quantity: line.quantity,
                bin_candidates: candidates.get(&line.id).cloned().unwrap_or_default(),
            })
            .collect();

        let picklist_id = PickListId::new();
        let mut picklist = PickList::empty(picklist_id);
        let events = picklist.execute(&PickListCommand::Create(CreatePickList {
            picklist_id,
            order_id: *order.id(),
            order_number: order.order_number().to_string(),
            order_status: order.status(),
            sources,
            occurred_at: Utc::now(),
        }))?;

        tx.insert_picklist(&picklist).await.map_err(|e| {
            if e.is_unique_violation_of(constraints::PICKLIST_ORDER)
                || e.is_unique_violation_of(constraints::PICK_TASK_LINE)
            {
                ServiceError::from(DomainError::conflict(format!(
                    "picklist already exists for order {}",
                    order.order_number()
                )))
            } else {
                e.into()
            }
        })?;
        self.audit_events(tx.as_mut(), &picklist, &events).await?;
        tx.commit().await?;

        info!(
            picklist_id = %picklist_id,
            order_number = %order.order_number(),
            tasks = picklist.tasks().len(),
            "picklist created"
        );
        Ok(picklist)
    }

    /// CREATED → IN_PROGRESS.
    #[instrument(skip(self), err)]
    pub async fn start(&self, picklist_id: PickListId) -> ServiceResult<PickList> {
        let mut tx = self.store.begin().await?;
        let mut picklist = load_picklist_for_update(tx.as_mut(), picklist_id).await?;

        let events = picklist.execute(&PickListCommand::Start(StartPickList {
            occurred_at: Utc::now(),
        }))?;
        tx.update_picklist(&picklist).await?;
        self.audit_events(tx.as_mut(), &picklist, &events).await?;
        tx.commit().await?;

        info!(picklist_id = %picklist_id, "picklist started");
        Ok(picklist)
    }

    /// OPEN → PICKED. Picking a task twice is rejected.
    #[instrument(skip(self), err)]
    pub async fn mark_task_picked(&self, task_id: PickTaskId) -> ServiceResult<PickTask> {
        let mut tx = self.store.begin().await?;
        let picklist_id = tx
            .picklist_id_for_task(task_id)
            .await?
            .ok_or_else(|| DomainError::not_found(PickTask::KIND, task_id.to_string()))?;
        let mut picklist = load_picklist_for_update(tx.as_mut(), picklist_id).await?;

        let events = picklist.execute(&PickListCommand::MarkTaskPicked(MarkTaskPicked {
            task_id,
            occurred_at: Utc::now(),
        }))?;
        let task = picklist
            .task(task_id)
            .cloned()
            .ok_or_else(|| DomainError::not_found(PickTask::KIND, task_id.to_string()))?;
        tx.update_pick_task(&task).await?;
        self.audit_events(tx.as_mut(), &picklist, &events).await?;
        tx.commit().await?;

        info!(picklist_id = %picklist_id, task_id = %task_id, "task picked");
        Ok(task)
    }

    /// IN_PROGRESS → DONE, once no task is OPEN.
    #[instrument(skip(self), err)]
    pub async fn done(&self, picklist_id: PickListId) -> ServiceResult<PickList> {
        let mut tx = self.store.begin().await?;
        let mut picklist = load_picklist_for_update(tx.as_mut(), picklist_id).await?;

        let events = picklist.execute(&PickListCommand::Finish(FinishPickList {
            occurred_at: Utc::now(),
        }))?;
        tx.update_picklist(&picklist).await?;
        self.audit_events(tx.as_mut(), &picklist, &events).await?;
        tx.commit().await?;

        info!(picklist_id = %picklist_id, "picklist done");
        Ok(picklist)
    }

    #[instrument(skip(self), err)]
    pub async fn show(&self, picklist_id: PickListId) -> ServiceResult<PickListView> {
        let mut tx = self.store.begin().await?;
        let picklist = tx
            .picklist_by_id(picklist_id)
            .await?
            .ok_or_else(|| DomainError::not_found(PickList::KIND, picklist_id.to_string()))?;
        picklist_view(tx.as_mut(), &picklist).await
    }

    /// The picklist generated for an order, if any was created.
    #[instrument(skip(self), err)]
    pub async fn show_for_order(&self, order_number: &str) -> ServiceResult<PickListView> {
        let number = DomainError::require_identifier("order number", order_number)?;
        let mut tx = self.store.begin().await?;
        let order = tx
            .order_by_number(number)
            .await?
            .ok_or_else(|| DomainError::not_found(Order::KIND, number))?;
        let picklist = match tx.picklist_id_for_order(*order.id()).await? {
            Some(id) => tx.picklist_by_id(id).await?,
            None => None,
        }
        .ok_or_else(|| DomainError::not_found(PickList::KIND, format!("order {number}")))?;
        picklist_view(tx.as_mut(), &picklist).await
    }

    /// Candidate bins per order line. Any failure yields no candidates.
    async fn bin_candidates(&self, order_number: &str) -> HashMap<OrderLineId, Vec<BinId>> {
        match self.lookup_bin_candidates(order_number).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(order_number, error = %e, "bin lookup failed; tasks get no bin");
                HashMap::new()
            }
        }
    }

    async fn lookup_bin_candidates(
        &self,
        order_number: &str,
    ) -> ServiceResult<HashMap<OrderLineId, Vec<BinId>>> {
        let mut tx = self.store.begin().await?;
        let Some(order) = tx.order_by_number(order_number).await? else {
            return Ok(HashMap::new());
        };

        let mut candidates = HashMap::new();
        for line in order.lines() {
            let bins = tx.bins_holding_item(line.item.id, line.location.id).await?;
            debug!(
                line_no = line.line_no,
                sku = %line.item.sku,
                location = %line.location.code,
                candidates = bins.len(),
                "bin candidates"
            );
            candidates.insert(line.id, bins);
        }
        Ok(candidates)
    }

    async fn audit_events(
        &self,
        tx: &mut dyn StoreTx,
        picklist: &PickList,
        events: &[PickListEvent],
    ) -> ServiceResult<()> {
        if let Some(audit) = &self.audit {
            audit
                .record_all(tx, PickList::KIND, &picklist.id().to_string(), events)
                .await?;
        }
        Ok(())
    }
}

async fn load_picklist_for_update(
    tx: &mut dyn StoreTx,
    picklist_id: PickListId,
) -> ServiceResult<PickList> {
    tx.picklist_by_id_for_update(picklist_id)
        .await?
        .ok_or_else(|| DomainError::not_found(PickList::KIND, picklist_id.to_string()).into())
}

async fn picklist_view(tx: &mut dyn StoreTx, picklist: &PickList) -> ServiceResult<PickListView> {
    let order = tx.order_by_id(picklist.order_id()).await?;
    let lines: HashMap<OrderLineId, _> = order
        .as_ref()
        .map(|o| o.lines().iter().map(|l| (l.id, l)).collect())
        .unwrap_or_default();

    let mut tasks = Vec::with_capacity(picklist.tasks().len());
    for task in picklist.tasks() {
        let line = lines.get(&task.order_line_id);
        let item_name = match line {
            Some(line) => tx.item_by_id(line.item.id).await?.map(|i| i.name),
            None => None,
        };
        let bin_code = match task.bin_id {
            Some(bin_id) => tx.bin_by_id(bin_id).await?.map(|b| b.code),
            None => None,
        };
        tasks.push(PickTaskView {
            id: task.id,
            line_no: line.map(|l| l.line_no),
            sku: line.map(|l| l.item.sku.clone()),
            item_name,
            location_code: line.map(|l| l.location.code.clone()),
            quantity: task.quantity.get(),
            status: task.status,
            picked_at: task.picked_at,
            bin_code,
        });
    }

    Ok(PickListView {
        id: *picklist.id(),
        order_number: picklist.order_number().to_string(),
        status: picklist.status(),
        created_at: picklist.created_at(),
        started_at: picklist.started_at(),
        done_at: picklist.done_at(),
        tasks,
    })
}
