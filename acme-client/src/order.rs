//! Order lifecycle operations: finalization and state polling.

use acme_core::order::Status;
use acme_core::Order;
use serde_json::json;

use crate::account::Account;
use crate::client::Client;
use crate::error::Error;

impl Client {
    /// Submit the CSR of an order which reached `ready`.
    ///
    /// `csr_der_b64u` is the unpadded base64url DER as produced by
    /// [`Csr::generate`](acme_core::csr::Csr). The returned order is usually `processing`;
    /// follow up with [`wait_order`](Client::wait_order) until it turns `valid`.
    pub async fn finalize(
        &self,
        account: &Account,
        order: &Order,
        csr_der_b64u: &str,
    ) -> Result<Order, Error> {
        if order.data.status != Status::Ready {
            return Err(Error::OrderNotReady {
                status: order.data.status,
            });
        }

        let finalize_url = order
            .data
            .finalize
            .as_deref()
            .ok_or_else(|| Error::InvalidApi("order carries no finalize URL".to_string()))?;

        let response = self
            .signed_post(account, finalize_url, Some(&json!({ "csr": csr_der_b64u })))
            .await?;
        if !response.is_success() {
            return Err(Error::from_response(finalize_url, &response));
        }

        tracing::info!(order = %order.url, "submitted CSR for finalization");
        Ok(Order {
            url: order.url.clone(),
            data: response.json()?,
        })
    }

    /// Poll an order until its status is one of `targets`.
    ///
    /// Polling happens at the configured interval for at most the configured number of
    /// attempts. An order observed as `invalid` fails immediately with
    /// [`Error::OrderInvalid`] carrying whatever error the CA attached; running out of
    /// attempts fails with [`Error::OrderTimeout`]. Status progression is checked to be
    /// monotonic, a CA moving an order backwards is treated as misbehavior.
    pub async fn wait_order(
        &self,
        account: &Account,
        order: &Order,
        targets: &[Status],
    ) -> Result<Order, Error> {
        let config = self.poll_config().clone();
        let mut last_rank = order.data.status.rank();

        for attempt in 1..=config.max_attempts {
            let current = self.fetch_order(account, &order.url).await?;
            let status = current.data.status;

            if targets.contains(&status) {
                return Ok(current);
            }

            if status == Status::Invalid {
                return Err(Error::OrderInvalid {
                    url: order.url.clone(),
                    problem: current.data.error,
                });
            }

            if status.rank() < last_rank {
                return Err(Error::InvalidApi(format!(
                    "order {} moved backwards to {:?}",
                    order.url, status
                )));
            }
            last_rank = status.rank();

            tracing::debug!(
                order = %order.url,
                ?status,
                attempt,
                "order not settled yet, polling again"
            );
            tokio::time::sleep(config.interval).await;
        }

        Err(Error::OrderTimeout {
            url: order.url.clone(),
            attempts: config.max_attempts,
        })
    }
}
