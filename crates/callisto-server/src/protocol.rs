//! WebSocket protocol frames.
//!
//! Clients call `ping` and `executeCell`; the server pushes
//! `startCellExecution` / `endCellExecution` notifications. Delivery of a
//! notification is acknowledged inside the server by the connection's
//! writer task once the frame is on the transport, so no client
//! cooperation is required for the coordinator to make progress.

use callisto_core::CellOutput;
use serde::{Deserialize, Serialize};

/// Frames sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientFrame {
    /// Liveness check.
    Ping {
        /// Request id, echoed in the reply.
        id: u64,
    },

    /// Submit a cell for execution.
    ///
    /// Fire-and-forget from the caller's perspective: the reply only
    /// confirms admission, results arrive via notifications.
    #[serde(rename_all = "camelCase")]
    ExecuteCell {
        /// Request id, echoed in the reply.
        id: u64,
        /// Notebook path.
        path: String,
        /// Cell identifier within the notebook.
        cell_id: String,
        /// Language tag (`typescript`, `typescriptreact`, `javascript`,
        /// `javascriptreact`).
        language: String,
        /// Raw cell source.
        code: String,
    },
}

/// Frames sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerFrame {
    /// Successful reply to a client request.
    Reply {
        /// Request id this replies to.
        id: u64,
        /// Result payload (`"pong"` for ping, `null` for executeCell).
        result: serde_json::Value,
    },

    /// Request-level error (e.g. unknown language, malformed frame).
    Error {
        /// Request id, when the error is attributable to one.
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        /// Error description.
        message: String,
    },

    /// A cell run started; no output has been produced yet.
    #[serde(rename_all = "camelCase")]
    StartCellExecution {
        /// Notebook path.
        path: String,
        /// Cell identifier.
        cell_id: String,
    },

    /// A cell run finished with the given output.
    #[serde(rename_all = "camelCase")]
    EndCellExecution {
        /// Notebook path.
        path: String,
        /// Cell identifier.
        cell_id: String,
        /// Normalized output of the run.
        cell_output: CellOutput,
    },
}
