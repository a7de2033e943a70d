//! 配置校验模块
//!
//! 校验规则：
//! - sink name 非空且唯一
//! - sink 类型所需参数齐全且非空
//! - tcp sink 的 addr 可解析为 socket 地址
//! - file sink 的 append 为 true / false

use std::collections::HashSet;
use std::net::SocketAddr;

use contracts::{ContractError, SinkConfig, SinkType, TeeBlueprint};

/// 校验 TeeBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &TeeBlueprint) -> Result<(), ContractError> {
    validate_sink_names(blueprint)?;
    for (idx, sink) in blueprint.sinks.iter().enumerate() {
        validate_sink_params(idx, sink)?;
    }
    Ok(())
}

/// 校验 sink name 非空且唯一
fn validate_sink_names(blueprint: &TeeBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, sink) in blueprint.sinks.iter().enumerate() {
        if sink.name.trim().is_empty() {
            return Err(ContractError::config_validation(
                format!("sinks[{}].name", idx),
                "sink name cannot be empty",
            ));
        }
        if !seen.insert(sink.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("sinks[name={}]", sink.name),
                "duplicate sink name",
            ));
        }
    }
    Ok(())
}

/// 校验类型相关参数
fn validate_sink_params(idx: usize, sink: &SinkConfig) -> Result<(), ContractError> {
    for &key in sink.sink_type.required_params() {
        match sink.params.get(key) {
            Some(value) if !value.trim().is_empty() => {}
            _ => {
                return Err(ContractError::config_validation(
                    format!("sinks[{}].params.{}", idx, key),
                    format!("{:?} sink '{}' requires '{}'", sink.sink_type, sink.name, key),
                ));
            }
        }
    }

    match sink.sink_type {
        SinkType::Tcp => {
            let addr = sink.params.get("addr").map(String::as_str).unwrap_or_default();
            if addr.parse::<SocketAddr>().is_err() {
                return Err(ContractError::config_validation(
                    format!("sinks[{}].params.addr", idx),
                    format!("'{}' is not a socket address", addr),
                ));
            }
        }
        SinkType::File => {
            if let Some(append) = sink.params.get("append") {
                if append != "true" && append != "false" {
                    return Err(ContractError::config_validation(
                        format!("sinks[{}].params.append", idx),
                        format!("append must be true or false, got '{}'", append),
                    ));
                }
            }
        }
        SinkType::Log | SinkType::Stdout => {}
    }
    Ok(())
}
