//! SIMCHA Callflow - Conversation Engine
//!
//! Drives the multi-step keypad dialogs of the celebration line:
//! - Step specifications and input grammar validation
//! - The menu/prompt engine with its bounded-retry loop
//! - The call flow orchestrator state machine
//! - The sub-flows (report, proxy report, lottery, vouchers, fulfillment)

pub mod flows;
pub mod menu;
pub mod orchestrator;
pub mod step;

pub use flows::{
    CallFlow, FlowContext, FlowSummary, FulfillmentFlow, LotteryFlow, ProxyReportFlow,
    ReportEventFlow, TrackSelectionFlow,
};
pub use menu::MenuEngine;
pub use orchestrator::{main_menu_options, terminal_message_key, CallState, MenuOption, Orchestrator};
pub use step::{EchoStyle, InputGrammar, StepSpec, ValueKind};
