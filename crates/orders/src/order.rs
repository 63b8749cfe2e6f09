use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wms_core::{Aggregate, DomainError, DomainResult, Entity, Event, OrderId, OrderLineId, Quantity};
use wms_inventory::{
    Balances, ItemRef, LocationRef, MovementType, StockKey, StockMovement, order_reference,
};

/// Direction of an order, fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Inbound,
    Outbound,
}

impl OrderType {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderType::Inbound => "INBOUND",
            OrderType::Outbound => "OUTBOUND",
        }
    }

    /// Ledger direction each line of this order type produces on posting.
    pub fn movement_type(self) -> MovementType {
        match self {
            OrderType::Inbound => MovementType::In,
            OrderType::Outbound => MovementType::Out,
        }
    }
}

impl core::fmt::Display for OrderType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INBOUND" => Ok(OrderType::Inbound),
            "OUTBOUND" => Ok(OrderType::Outbound),
            other => Err(DomainError::validation(format!("unknown order type: {other}"))),
        }
    }
}

/// Order status lifecycle: DRAFT → POSTED or DRAFT → CANCELLED. Both targets are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Draft,
    Posted,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Draft => "DRAFT",
            OrderStatus::Posted => "POSTED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DRAFT" => Ok(OrderStatus::Draft),
            "POSTED" => Ok(OrderStatus::Posted),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            other => Err(DomainError::validation(format!("unknown order status: {other}"))),
        }
    }
}

/// Order line: item + location + quantity. A reservation intent, not an allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: OrderLineId,
    pub line_no: u32,
    pub item: ItemRef,
    pub location: LocationRef,
    pub quantity: Quantity,
}

impl OrderLine {
    pub fn stock_key(&self) -> StockKey {
        StockKey::new(self.item.id, self.location.id)
    }
}

/// Aggregate root: Order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    id: OrderId,
    order_number: String,
    order_type: OrderType,
    status: OrderStatus,
    created_at: DateTime<Utc>,
    lines: Vec<OrderLine>,
    created: bool,
}

impl Order {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            order_number: String::new(),
            order_type: OrderType::Inbound,
            status: OrderStatus::Draft,
            created_at: DateTime::<Utc>::default(),
            lines: Vec::new(),
            created: false,
        }
    }

    /// Rebuild an order from its stored row and lines.
    pub fn restore(
        id: OrderId,
        order_number: String,
        order_type: OrderType,
        status: OrderStatus,
        created_at: DateTime<Utc>,
        mut lines: Vec<OrderLine>,
    ) -> Self {
        lines.sort_by_key(|l| l.line_no);
        Self {
            id,
            order_number,
            order_type,
            status,
            created_at,
            lines,
            created: true,
        }
    }

    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    pub fn order_type(&self) -> OrderType {
        self.order_type
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn is_modifiable(&self) -> bool {
        matches!(self.status, OrderStatus::Draft)
    }

    /// Fails with `InvalidStatusTransition` unless the order is still DRAFT.
    pub fn ensure_draft(&self, action: &'static str) -> DomainResult<()> {
        if !self.is_modifiable() {
            return Err(DomainError::invalid_transition(
                Self::KIND,
                self.order_number.clone(),
                self.status,
                action,
            ));
        }
        Ok(())
    }

    /// Stock keys whose balances must be locked and read before posting,
    /// sorted so concurrent postings acquire locks in the same order.
    /// Inbound keys are included so deposits are checked against the
    /// maximum balance.
    pub fn stock_keys(&self) -> Vec<StockKey> {
        let mut keys: Vec<StockKey> = self.lines.iter().map(OrderLine::stock_key).collect();
        keys.sort();
        keys.dedup();
        keys
    }
}

impl Entity for Order {
    type Id = OrderId;
    const KIND: &'static str = "order";

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Command: CreateOrder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOrder {
    pub order_id: OrderId,
    pub order_number: String,
    pub order_type: OrderType,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddLine. Item and location are already resolved from the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddLine {
    pub line_id: OrderLineId,
    pub item: ItemRef,
    pub location: LocationRef,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: PostOrder.
///
/// `balances` holds the current ledger balance of every key returned by
/// `Order::stock_keys`, read inside the posting transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostOrder {
    pub balances: Balances,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelOrder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelOrder {
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderCommand {
    Create(CreateOrder),
    AddLine(AddLine),
    Post(PostOrder),
    Cancel(CancelOrder),
}

/// Event: OrderCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order_id: OrderId,
    pub order_number: String,
    pub order_type: OrderType,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAdded {
    pub order_id: OrderId,
    pub line: OrderLine,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderPosted. Carries exactly one movement per line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPosted {
    pub order_id: OrderId,
    pub order_number: String,
    pub movements: Vec<StockMovement>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub order_id: OrderId,
    pub order_number: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderCreated(OrderCreated),
    LineAdded(LineAdded),
    OrderPosted(OrderPosted),
    OrderCancelled(OrderCancelled),
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderCreated(_) => "orders.order.created",
            OrderEvent::LineAdded(_) => "orders.order.line_added",
            OrderEvent::OrderPosted(_) => "orders.order.posted",
            OrderEvent::OrderCancelled(_) => "orders.order.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderCreated(e) => e.occurred_at,
            OrderEvent::LineAdded(e) => e.occurred_at,
            OrderEvent::OrderPosted(e) => e.occurred_at,
            OrderEvent::OrderCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::OrderCreated(e) => {
                self.id = e.order_id;
                self.order_number = e.order_number.clone();
                self.order_type = e.order_type;
                self.status = OrderStatus::Draft;
                self.created_at = e.occurred_at;
                self.lines.clear();
                self.created = true;
            }
            OrderEvent::LineAdded(e) => {
                self.lines.push(e.line.clone());
            }
            OrderEvent::OrderPosted(_) => {
                self.status = OrderStatus::Posted;
            }
            OrderEvent::OrderCancelled(_) => {
                self.status = OrderStatus::Cancelled;
            }
        }
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::Create(cmd) => self.handle_create(cmd),
            OrderCommand::AddLine(cmd) => self.handle_add_line(cmd),
            OrderCommand::Post(cmd) => self.handle_post(cmd),
            OrderCommand::Cancel(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl Order {
    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(Self::KIND, self.id.to_string()));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateOrder) -> Result<Vec<OrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict(format!(
                "order {} already exists",
                self.order_number
            )));
        }
        let order_number = DomainError::require_identifier("order number", &cmd.order_number)?;

        Ok(vec![OrderEvent::OrderCreated(OrderCreated {
            order_id: cmd.order_id,
            order_number: order_number.to_string(),
            order_type: cmd.order_type,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_line(&self, cmd: &AddLine) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_draft("add a line to")?;
        let quantity = Quantity::new(cmd.quantity)?;

        let next_line_no = self.lines.iter().map(|l| l.line_no).max().unwrap_or(0) + 1;

        Ok(vec![OrderEvent::LineAdded(LineAdded {
            order_id: self.id,
            line: OrderLine {
                id: cmd.line_id,
                line_no: next_line_no,
                item: cmd.item.clone(),
                location: cmd.location.clone(),
                quantity,
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    /// All-or-nothing: either one movement per line is planned, or the
    /// first line that cannot be satisfied fails the whole command.
    fn handle_post(&self, cmd: &PostOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_draft("post")?;

        if self.lines.is_empty() {
            return Err(DomainError::NoLines {
                order_number: self.order_number.clone(),
            });
        }

        let reference = order_reference(&self.order_number);
        let mut balances = cmd.balances.clone();
        let mut movements = Vec::with_capacity(self.lines.len());

        for line in &self.lines {
            match self.order_type {
                OrderType::Inbound => {
                    balances.deposit(&line.item, &line.location, line.quantity)?
                }
                OrderType::Outbound => {
                    balances.withdraw(&line.item, &line.location, line.quantity)?
                }
            }
            movements.push(StockMovement::new(
                self.order_type.movement_type(),
                line.item.id,
                line.location.id,
                line.quantity,
                Some(&reference),
                cmd.occurred_at,
            ));
        }

        Ok(vec![OrderEvent::OrderPosted(OrderPosted {
            order_id: self.id,
            order_number: self.order_number.clone(),
            movements,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_draft("cancel")?;

        Ok(vec![OrderEvent::OrderCancelled(OrderCancelled {
            order_id: self.id,
            order_number: self.order_number.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
