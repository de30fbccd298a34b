/*!
 * Core orchestration: fetch units, batches, work lists and events
 */

pub mod batch;
pub mod fetch;
pub mod progress;
pub mod worklist;
