//! Introspection snapshots

use super::object::Coroutine;
use crate::engine::CoroutineId;
use serde::Serialize;

/// Point-in-time view of a coroutine
#[derive(Debug, Clone, Serialize)]
pub struct CoroutineInfo {
    pub id: CoroutineId,

    /// State name (`ready`, `running`, `waiting`, `dead`)
    pub state: String,

    /// Milliseconds since the first resume
    pub elapsed_ms: u64,

    pub is_scheduler: bool,

    /// Coroutine that first switched into this one
    pub origin: Option<CoroutineId>,

    /// Coroutine that regains control when this one yields
    pub previous: Option<CoroutineId>,

    pub ref_count: usize,

    pub stack_page_size: usize,

    /// Activation-stack pages reserved so far
    pub stack_pages: usize,

    /// Activation frames, innermost first
    pub trace: Vec<String>,
}

impl CoroutineInfo {
    pub(crate) fn of(coroutine: &Coroutine) -> Self {
        Self {
            id: coroutine.id(),
            state: coroutine.state_name().to_string(),
            elapsed_ms: u64::try_from(coroutine.elapsed().as_millis()).unwrap_or(u64::MAX),
            is_scheduler: coroutine.is_scheduler(),
            origin: coroutine.origin().map(|c| c.id()),
            previous: coroutine.previous().map(|c| c.id()),
            ref_count: coroutine.ref_count(),
            stack_page_size: coroutine.stack_page_size(),
            stack_pages: coroutine.stack_pages(),
            trace: coroutine.trace(0),
        }
    }
}

/// Dump a registered coroutine as JSON
pub fn dump_by_id(id: CoroutineId) -> Option<serde_json::Result<String>> {
    Coroutine::get(id).map(|coroutine| coroutine.dump())
}

/// Dump every registered coroutine as a JSON array
pub fn dump_all() -> serde_json::Result<String> {
    let infos: Vec<CoroutineInfo> = Coroutine::all().iter().map(CoroutineInfo::of).collect();
    serde_json::to_string_pretty(&infos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_main_info() {
        let main = Coroutine::main();
        let info = main.info();
        assert_eq!(info.id, main.id());
        assert_eq!(info.state, "running");
        assert!(info.origin.is_none());
        assert!(info.previous.is_none());
        assert!(!info.is_scheduler);
        assert_eq!(info.stack_pages, 1);
    }

    #[test]
    fn test_dump_all_lists_main() {
        let json = dump_all().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        let entries = parsed.as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["id"], Coroutine::main().id().as_u64());
        assert!(dump_by_id(CoroutineId::from_u64(u64::MAX)).is_none());
    }
}
