//! DTO <-> gateway type mapping for the live broker adapter.

use oflow_db::{OrderResult, OrderStatus, Side};
use oflow_gateway::{Account, BrokerPosition};
use oflow_schemas::{BrokerAccountDto, BrokerPositionDto, BrokerQuoteDto};

pub(crate) fn order_result_from_dto(dto: oflow_schemas::BrokerOrderDto) -> anyhow::Result<OrderResult> {
    Ok(OrderResult {
        client_id: dto.client_order_id,
        symbol: dto.symbol,
        side: Side::parse(&dto.side)?,
        shares: dto.qty,
        limit_price: dto.limit_price.unwrap_or(0.0),
        status: OrderStatus::parse(&dto.status.to_ascii_uppercase())?,
        filled_shares: dto.filled_qty,
        avg_price: dto.avg_fill_price,
        broker_id: Some(dto.broker_order_id),
        reject_reason: dto.reject_reason,
    })
}

pub(crate) fn account_from_dto(dto: BrokerAccountDto) -> Account {
    Account {
        equity: dto.equity,
        cash: dto.cash,
        buying_power: dto.buying_power,
    }
}

pub(crate) fn position_from_dto(dto: BrokerPositionDto) -> BrokerPosition {
    BrokerPosition {
        symbol: dto.symbol,
        shares: dto.qty,
        avg_cost: dto.avg_cost,
    }
}

pub(crate) fn quote_stale(dto: &BrokerQuoteDto) -> bool {
    dto.stale
}
