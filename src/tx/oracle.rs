use crate::config::Config;
use crate::ptb::{Argument, PtbError, Transaction};
use crate::reader::ORACLE_MODULE;
use crate::types::Address;

/// `gas_oracle::submit_observation(oracle, policy, tx_digest: String, gas_used_mist)`
pub fn submit_observation(
    tx: &mut Transaction,
    cfg: &Config,
    policy_id: Address,
    tx_digest: &str,
    gas_used_mist: u64,
) -> Result<Argument, PtbError> {
    let oracle = tx.object(cfg.oracle_id);
    let policy = tx.object(policy_id);
    let digest = tx.pure(tx_digest)?;
    let gas = tx.pure_u64(gas_used_mist);
    Ok(tx.move_call(
        cfg.package_id,
        ORACLE_MODULE,
        "submit_observation",
        vec![oracle, policy, digest, gas],
    ))
}

/// `gas_oracle::set_operator(oracle, operator, enabled)`; `None` enables.
pub fn set_operator(
    tx: &mut Transaction,
    cfg: &Config,
    operator: Address,
    enabled: Option<bool>,
) -> Argument {
    let oracle = tx.object(cfg.oracle_id);
    let who = tx.pure_address(operator);
    let enabled = tx.pure_bool(enabled.unwrap_or(true));
    tx.move_call(
        cfg.package_id,
        ORACLE_MODULE,
        "set_operator",
        vec![oracle, who, enabled],
    )
}
