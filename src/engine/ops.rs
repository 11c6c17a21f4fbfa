//! Op surface exposed to script.
//!
//! Two ops cross the boundary: `op_reverse_call` is the trampoline behind
//! every registered reverse-call wrapper, and `op_console_log` carries the
//! runtime's console output into the host's `log` facade.

use crate::engine::dispatch::ReverseCalls;
use deno_core::{extension, op2, Extension, OpState};
use std::sync::Arc;

/// Name of the script loaded at engine start. Reserved; `define_script_file`
/// rejects it.
pub(crate) const MAIN_SCRIPT_NAME: &str = "main.js";

/// The main script. It doesn't do much; most execution is driven by defining
/// additional named script files and evaluating script code strings. The
/// severity constants must match [`op_console_log`].
pub(crate) const MAIN_SCRIPT_CODE: &str = r#"
globalThis.console = {
    error: function (...args) { Deno.core.ops.op_console_log(1, args.map(String).join(" ")); },
    warn:  function (...args) { Deno.core.ops.op_console_log(2, args.map(String).join(" ")); },
    info:  function (...args) { Deno.core.ops.op_console_log(3, args.map(String).join(" ")); },
    log:   function (...args) { Deno.core.ops.op_console_log(4, args.map(String).join(" ")); },
    debug: function (...args) { Deno.core.ops.op_console_log(5, args.map(String).join(" ")); },
};
"#;

/// Script installing a global wrapper function for one registered name.
/// The wrapper forwards its arguments to the dispatcher as one JSON array.
pub(crate) fn reverse_call_wrapper(function_name: &str) -> String {
    format!(
        "globalThis[\"{name}\"] = function () {{ \
            Deno.core.ops.op_reverse_call(\"{name}\", \
            JSON.stringify(Array.prototype.slice.call(arguments))); \
        }};",
        name = function_name
    )
}

extension!(
    jshost_bridge,
    ops = [op_reverse_call, op_console_log],
    options = { reverse: Arc<ReverseCalls> },
    state = |state, options| {
        state.put(options.reverse);
    },
);

/// Build the bridge extension for one engine instance.
pub(crate) fn bridge_extension(reverse: Arc<ReverseCalls>) -> Extension {
    jshost_bridge::init_ops(reverse)
}

#[op2(fast)]
fn op_reverse_call(state: &mut OpState, #[string] function_name: &str, #[string] args_json: &str) {
    let reverse = state.borrow::<Arc<ReverseCalls>>().clone();
    reverse.dispatch(function_name, args_json.to_string());
}

#[op2(fast)]
fn op_console_log(#[smi] level: u32, #[string] message: &str) {
    const TARGET: &str = "jshost::script";
    match level {
        1 => log::error!(target: TARGET, "{}", message),
        2 => log::warn!(target: TARGET, "{}", message),
        3 => log::info!(target: TARGET, "{}", message),
        4 => log::debug!(target: TARGET, "{}", message),
        _ => log::trace!(target: TARGET, "{}", message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapper_forwards_to_reverse_call_op() {
        let wrapper = reverse_call_wrapper("onUpdate");
        assert!(wrapper.contains("globalThis[\"onUpdate\"]"));
        assert!(wrapper.contains("op_reverse_call(\"onUpdate\""));
        assert!(wrapper.contains("JSON.stringify"));
    }
}
