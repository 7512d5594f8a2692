//! Contract gateway: descriptor-checked invocations over an RPC transport.

use crate::descriptor::InterfaceDescriptor;
use crate::error::ContractResult;
use crate::transport::DynRpcTransport;
use crate::value::ContractValue;
use perpdex_registry::ContractAddress;
use perpdex_telemetry::Metrics;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// One deployed contract reachable through a transport.
#[derive(Clone)]
pub struct ContractGateway {
    descriptor: Arc<InterfaceDescriptor>,
    contract_id: ContractAddress,
    transport: DynRpcTransport,
}

impl ContractGateway {
    pub fn new(
        descriptor: Arc<InterfaceDescriptor>,
        contract_id: ContractAddress,
        transport: DynRpcTransport,
    ) -> Self {
        Self {
            descriptor,
            contract_id,
            transport,
        }
    }

    pub fn descriptor(&self) -> &InterfaceDescriptor {
        &self.descriptor
    }

    pub fn contract_id(&self) -> &ContractAddress {
        &self.contract_id
    }

    /// Invoke `method` with `args`.
    ///
    /// Arguments are checked against the descriptor before anything is sent.
    pub async fn invoke(
        &self,
        method: &str,
        args: Vec<ContractValue>,
    ) -> ContractResult<ContractValue> {
        let call = match self
            .descriptor
            .encode_call(self.contract_id.as_str(), method, &args)
        {
            Ok(call) => call,
            Err(e) => {
                Metrics::contract_invocation(method, "invalid");
                warn!(method, error = %e, "Contract call rejected locally");
                return Err(e);
            }
        };

        let started = Instant::now();
        debug!(method, contract = %self.contract_id.short(), "Invoking contract");

        let result = self
            .transport
            .invoke(call)
            .await
            .and_then(|raw| self.descriptor.decode_result(method, &raw));
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(_) => {
                Metrics::contract_invocation(method, "ok");
                info!(method, elapsed_ms, "Contract call succeeded");
            }
            Err(e) => {
                let outcome = if e.is_retryable() { "retryable" } else { "error" };
                Metrics::contract_invocation(method, outcome);
                warn!(
                    method,
                    elapsed_ms,
                    error = %e,
                    retryable = e.is_retryable(),
                    "Contract call failed"
                );
            }
        }
        result
    }
}
