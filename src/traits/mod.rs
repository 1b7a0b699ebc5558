pub mod fsm;
pub mod protocol;
