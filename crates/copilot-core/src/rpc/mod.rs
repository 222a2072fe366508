mod client;
mod stdio_json;

pub use client::{RpcError, ToolDescriptor, ToolServerClient};
pub use stdio_json::{extract_result_text, JsonRpcError, JsonRpcRequest, JsonRpcResponse};
