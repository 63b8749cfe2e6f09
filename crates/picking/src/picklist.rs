use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wms_core::{
    Aggregate, BinId, DomainError, Entity, Event, OrderId, OrderLineId, PickListId, PickTaskId,
    Quantity,
};
use wms_orders::OrderStatus;

/// Picklist lifecycle: CREATED → IN_PROGRESS → DONE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PickListStatus {
    Created,
    InProgress,
    Done,
}

impl PickListStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PickListStatus::Created => "CREATED",
            PickListStatus::InProgress => "IN_PROGRESS",
            PickListStatus::Done => "DONE",
        }
    }
}

impl core::fmt::Display for PickListStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PickListStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CREATED" => Ok(PickListStatus::Created),
            "IN_PROGRESS" => Ok(PickListStatus::InProgress),
            "DONE" => Ok(PickListStatus::Done),
            other => Err(DomainError::validation(format!(
                "unknown picklist status: {other}"
            ))),
        }
    }
}

/// Pick task lifecycle: OPEN → PICKED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PickTaskStatus {
    Open,
    Picked,
}

impl PickTaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PickTaskStatus::Open => "OPEN",
            PickTaskStatus::Picked => "PICKED",
        }
    }
}

impl core::fmt::Display for PickTaskStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PickTaskStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OPEN" => Ok(PickTaskStatus::Open),
            "PICKED" => Ok(PickTaskStatus::Picked),
            other => Err(DomainError::validation(format!(
                "unknown pick task status: {other}"
            ))),
        }
    }
}

/// One unit of picking work, tied to exactly one order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickTask {
    pub id: PickTaskId,
    pub order_line_id: OrderLineId,
    pub quantity: Quantity,
    pub status: PickTaskStatus,
    pub picked_at: Option<DateTime<Utc>>,
    /// Advisory bin suggestion; picking works without it.
    pub bin_id: Option<BinId>,
}

impl Entity for PickTask {
    type Id = PickTaskId;
    const KIND: &'static str = "pick task";

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// An order line as seen by picklist creation, with the bins at the line's
/// location that currently hold the line's item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSource {
    pub order_line_id: OrderLineId,
    pub quantity: Quantity,
    pub bin_candidates: Vec<BinId>,
}

/// Best-effort bin resolution: a bin is suggested only when exactly one
/// candidate exists. No candidates or an ambiguous set leave the task without
/// a bin.
pub fn resolve_bin(candidates: &[BinId]) -> Option<BinId> {
    match candidates {
        [only] => Some(*only),
        _ => None,
    }
}

/// Aggregate root: PickList.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickList {
    id: PickListId,
    order_id: OrderId,
    order_number: String,
    status: PickListStatus,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    done_at: Option<DateTime<Utc>>,
    tasks: Vec<PickTask>,
    created: bool,
}

impl PickList {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: PickListId) -> Self {
        Self {
            id,
            order_id: OrderId::default(),
            order_number: String::new(),
            status: PickListStatus::Created,
            created_at: DateTime::<Utc>::default(),
            started_at: None,
            done_at: None,
            tasks: Vec::new(),
            created: false,
        }
    }

    /// Rebuild a picklist from its stored row and tasks.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: PickListId,
        order_id: OrderId,
        order_number: String,
        status: PickListStatus,
        created_at: DateTime<Utc>,
        started_at: Option<DateTime<Utc>>,
        done_at: Option<DateTime<Utc>>,
        tasks: Vec<PickTask>,
    ) -> Self {
        Self {
            id,
            order_id,
            order_number,
            status,
            created_at,
            started_at,
            done_at,
            tasks,
            created: true,
        }
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    pub fn status(&self) -> PickListStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn done_at(&self) -> Option<DateTime<Utc>> {
        self.done_at
    }

    pub fn tasks(&self) -> &[PickTask] {
        &self.tasks
    }

    pub fn task(&self, task_id: PickTaskId) -> Option<&PickTask> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    pub fn open_task_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == PickTaskStatus::Open)
            .count()
    }
}

impl Entity for PickList {
    type Id = PickListId;
    const KIND: &'static str = "picklist";

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Command: CreatePickList.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePickList {
    pub picklist_id: PickListId,
    pub order_id: OrderId,
    pub order_number: String,
    pub order_status: OrderStatus,
    pub sources: Vec<TaskSource>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: StartPickList.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartPickList {
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkTaskPicked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkTaskPicked {
    pub task_id: PickTaskId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: FinishPickList.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishPickList {
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickListCommand {
    Create(CreatePickList),
    Start(StartPickList),
    MarkTaskPicked(MarkTaskPicked),
    Finish(FinishPickList),
}

/// Event: PickListCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickListCreated {
    pub picklist_id: PickListId,
    pub order_id: OrderId,
    pub order_number: String,
    pub tasks: Vec<PickTask>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PickListStarted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickListStarted {
    pub picklist_id: PickListId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TaskPicked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPicked {
    pub picklist_id: PickListId,
    pub task_id: PickTaskId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PickListDone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickListDone {
    pub picklist_id: PickListId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PickListEvent {
    PickListCreated(PickListCreated),
    PickListStarted(PickListStarted),
    TaskPicked(TaskPicked),
    PickListDone(PickListDone),
}

impl Event for PickListEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PickListEvent::PickListCreated(_) => "picking.picklist.created",
            PickListEvent::PickListStarted(_) => "picking.picklist.started",
            PickListEvent::TaskPicked(_) => "picking.task.picked",
            PickListEvent::PickListDone(_) => "picking.picklist.done",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PickListEvent::PickListCreated(e) => e.occurred_at,
            PickListEvent::PickListStarted(e) => e.occurred_at,
            PickListEvent::TaskPicked(e) => e.occurred_at,
            PickListEvent::PickListDone(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PickList {
    type Command = PickListCommand;
    type Event = PickListEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PickListEvent::PickListCreated(e) => {
                self.id = e.picklist_id;
                self.order_id = e.order_id;
                self.order_number = e.order_number.clone();
                self.status = PickListStatus::Created;
                self.created_at = e.occurred_at;
                self.started_at = None;
                self.done_at = None;
                self.tasks = e.tasks.clone();
                self.created = true;
            }
            PickListEvent::PickListStarted(e) => {
                self.status = PickListStatus::InProgress;
                self.started_at = Some(e.occurred_at);
            }
            PickListEvent::TaskPicked(e) => {
                if let Some(task) = self.tasks.iter_mut().find(|t| t.id == e.task_id) {
                    task.status = PickTaskStatus::Picked;
                    task.picked_at = Some(e.occurred_at);
                }
            }
            PickListEvent::PickListDone(e) => {
                self.status = PickListStatus::Done;
                self.done_at = Some(e.occurred_at);
            }
        }
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PickListCommand::Create(cmd) => self.handle_create(cmd),
            PickListCommand::Start(cmd) => self.handle_start(cmd),
            PickListCommand::MarkTaskPicked(cmd) => self.handle_mark_picked(cmd),
            PickListCommand::Finish(cmd) => self.handle_finish(cmd),
        }
    }
}

impl PickList {
    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(Self::KIND, self.id.to_string()));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreatePickList) -> Result<Vec<PickListEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict(format!(
                "picklist already exists for order {}",
                self.order_number
            )));
        }
        if cmd.order_status != OrderStatus::Posted {
            return Err(DomainError::invalid_transition(
                "order",
                cmd.order_number.clone(),
                cmd.order_status,
                "create a picklist for",
            ));
        }
        if cmd.sources.is_empty() {
            return Err(DomainError::NoLines {
                order_number: cmd.order_number.clone(),
            });
        }

        let tasks = cmd
            .sources
            .iter()
            .map(|source| PickTask {
                id: PickTaskId::new(),
                order_line_id: source.order_line_id,
                quantity: source.quantity,
                status: PickTaskStatus::Open,
                picked_at: None,
                bin_id: resolve_bin(&source.bin_candidates),
            })
            .collect();

        Ok(vec![PickListEvent::PickListCreated(PickListCreated {
            picklist_id: cmd.picklist_id,
            order_id: cmd.order_id,
            order_number: cmd.order_number.clone(),
            tasks,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_start(&self, cmd: &StartPickList) -> Result<Vec<PickListEvent>, DomainError> {
        self.ensure_created()?;
        if self.status != PickListStatus::Created {
            return Err(DomainError::invalid_transition(
                Self::KIND,
                self.id.to_string(),
                self.status,
                "start",
            ));
        }

        Ok(vec![PickListEvent::PickListStarted(PickListStarted {
            picklist_id: self.id,
            occurred_at: cmd.occurred_at,
        })])
    }

    /// Re-picking is rejected rather than ignored so a task is never counted twice.
    fn handle_mark_picked(&self, cmd: &MarkTaskPicked) -> Result<Vec<PickListEvent>, DomainError> {
        self.ensure_created()?;
        let task = self
            .task(cmd.task_id)
            .ok_or_else(|| DomainError::not_found(PickTask::KIND, cmd.task_id.to_string()))?;

        if task.status != PickTaskStatus::Open {
            return Err(DomainError::invalid_transition(
                PickTask::KIND,
                task.id.to_string(),
                task.status,
                "pick",
            ));
        }

        Ok(vec![PickListEvent::TaskPicked(TaskPicked {
            picklist_id: self.id,
            task_id: task.id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_finish(&self, cmd: &FinishPickList) -> Result<Vec<PickListEvent>, DomainError> {
        self.ensure_created()?;
        if self.status != PickListStatus::InProgress {
            return Err(DomainError::invalid_transition(
                Self::KIND,
                self.id.to_string(),
                self.status,
                "finish",
            ));
        }

        let open = self.open_task_count();
        if open > 0 {
            return Err(DomainError::OpenTasksRemaining {
                picklist: self.id.to_string(),
                open,
            });
        }

        Ok(vec![PickListEvent::PickListDone(PickListDone {
            picklist_id: self.id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn source(quantity: i64, bin_candidates: Vec<BinId>) -> TaskSource {
        TaskSource {
            order_line_id: OrderLineId::new(),
            quantity: Quantity::new(quantity).unwrap(),
            bin_candidates,
        }
    }

    fn create_cmd(order_status: OrderStatus, sources: Vec<TaskSource>) -> PickListCommand {
        PickListCommand::Create(CreatePickList {
            picklist_id: PickListId::new(),
            order_id: OrderId::new(),
            order_number: "O1".to_string(),
            order_status,
            sources,
            occurred_at: test_time(),
        })
    }

    fn created_picklist(sources: Vec<TaskSource>) -> PickList {
        let mut picklist = PickList::empty(PickListId::new());
        picklist
            .execute(&create_cmd(OrderStatus::Posted, sources))
            .unwrap();
        picklist
    }

    fn start() -> PickListCommand {
        PickListCommand::Start(StartPickList {
            occurred_at: test_time(),
        })
    }

    fn finish() -> PickListCommand {
        PickListCommand::Finish(FinishPickList {
            occurred_at: test_time(),
        })
    }

    fn pick(task_id: PickTaskId) -> PickListCommand {
        PickListCommand::MarkTaskPicked(MarkTaskPicked {
            task_id,
            occurred_at: test_time(),
        })
    }

    #[test]
    fn resolve_bin_only_suggests_an_unambiguous_bin() {
        let (a, b) = (BinId::new(), BinId::new());
        assert_eq!(resolve_bin(&[]), None);
        assert_eq!(resolve_bin(&[a]), Some(a));
        assert_eq!(resolve_bin(&[a, b]), None);
    }

    #[test]
    fn create_builds_one_open_task_per_line() {
        let bin = BinId::new();
        let picklist = created_picklist(vec![source(4, vec![bin]), source(2, vec![])]);

        assert_eq!(picklist.status(), PickListStatus::Created);
        assert_eq!(picklist.tasks().len(), 2);
        assert!(picklist.tasks().iter().all(|t| t.status == PickTaskStatus::Open));
        assert_eq!(picklist.tasks()[0].quantity.get(), 4);
        assert_eq!(picklist.tasks()[0].bin_id, Some(bin));
        assert_eq!(picklist.tasks()[1].bin_id, None);
        assert_eq!(picklist.open_task_count(), 2);
    }

    #[test]
    fn create_requires_a_posted_order() {
        let picklist = PickList::empty(PickListId::new());
        for status in [OrderStatus::Draft, OrderStatus::Cancelled] {
            let err = picklist
                .handle(&create_cmd(status, vec![source(1, vec![])]))
                .unwrap_err();
            assert!(matches!(
                err,
                DomainError::InvalidStatusTransition { entity: "order", .. }
            ));
        }
    }

    #[test]
    fn second_create_is_a_conflict() {
        let picklist = created_picklist(vec![source(1, vec![])]);
        let err = picklist
            .handle(&create_cmd(OrderStatus::Posted, vec![source(1, vec![])]))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(msg) if msg.contains("already exists")));
    }

    #[test]
    fn start_only_from_created() {
        let mut picklist = created_picklist(vec![source(1, vec![])]);
        picklist.execute(&start()).unwrap();
        assert_eq!(picklist.status(), PickListStatus::InProgress);
        assert!(picklist.started_at().is_some());

        let err = picklist.handle(&start()).unwrap_err();
        assert!(matches!(err, DomainError::InvalidStatusTransition { action: "start", .. }));
    }

    #[test]
    fn picking_twice_is_rejected() {
        let mut picklist = created_picklist(vec![source(1, vec![])]);
        let task_id = picklist.tasks()[0].id;

        picklist.execute(&pick(task_id)).unwrap();
        assert_eq!(picklist.task(task_id).unwrap().status, PickTaskStatus::Picked);
        assert!(picklist.task(task_id).unwrap().picked_at.is_some());

        let err = picklist.handle(&pick(task_id)).unwrap_err();
        assert!(matches!(
            err,
            DomainError::InvalidStatusTransition { entity: "pick task", .. }
        ));
    }

    #[test]
    fn unknown_task_is_not_found() {
        let picklist = created_picklist(vec![source(1, vec![])]);
        let err = picklist.handle(&pick(PickTaskId::new())).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn finish_requires_in_progress_and_no_open_tasks() {
        let mut picklist = created_picklist(vec![source(1, vec![]), source(3, vec![])]);

        let err = picklist.handle(&finish()).unwrap_err();
        assert!(matches!(err, DomainError::InvalidStatusTransition { action: "finish", .. }));

        picklist.execute(&start()).unwrap();
        let first = picklist.tasks()[0].id;
        picklist.execute(&pick(first)).unwrap();

        let err = picklist.handle(&finish()).unwrap_err();
        assert!(matches!(err, DomainError::OpenTasksRemaining { open: 1, .. }));

        let second = picklist.tasks()[1].id;
        picklist.execute(&pick(second)).unwrap();
        picklist.execute(&finish()).unwrap();
        assert_eq!(picklist.status(), PickListStatus::Done);
        assert!(picklist.done_at().is_some());
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let picklist = created_picklist(vec![source(1, vec![])]);
        let before = picklist.clone();
        let task_id = picklist.tasks()[0].id;
        let events = picklist.handle(&pick(task_id)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(picklist, before);
    }

    proptest! {
        /// Property: finishing succeeds exactly when every task has been picked.
        #[test]
        fn finish_succeeds_only_when_all_tasks_picked(
            task_count in 1usize..10,
            picked in prop::collection::vec(any::<bool>(), 10)
        ) {
            let sources = (0..task_count).map(|_| source(1, vec![])).collect();
            let mut picklist = created_picklist(sources);
            picklist.execute(&start()).unwrap();

            let ids: Vec<PickTaskId> = picklist.tasks().iter().map(|t| t.id).collect();
            let mut picked_count = 0;
            for (id, do_pick) in ids.iter().zip(picked.iter()) {
                if *do_pick {
                    picklist.execute(&pick(*id)).unwrap();
                    picked_count += 1;
                }
            }

            let result = picklist.handle(&finish());
            prop_assert_eq!(result.is_ok(), picked_count == task_count);
        }
    }
}
