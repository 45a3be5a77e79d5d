//! Loyalty rule resolution and administration

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

use crate::entities::loyalties;
use crate::error::AppError;
use crate::models::loyalty::{CreateRuleRequest, LoyaltyType, UpdateRuleRequest};
use crate::store::{LoyaltyRepository, NewRule, RuleChanges};

pub struct LoyaltyRuleService {
    store: Arc<dyn LoyaltyRepository>,
}

impl LoyaltyRuleService {
    pub fn new(store: Arc<dyn LoyaltyRepository>) -> Self {
        Self { store }
    }

    /// Rule for `code` in `owner_id`'s program, or `RuleNotFound`
    pub async fn resolve(&self, owner_id: i32, code: &str) -> Result<loyalties::Model, AppError> {
        self.store
            .find_rule(owner_id, code)
            .await?
            .ok_or_else(|| AppError::RuleNotFound {
                owner_id,
                code: code.to_string(),
            })
    }

    pub async fn list(&self, owner_id: i32) -> Result<Vec<loyalties::Model>, AppError> {
        self.store.list_rules(owner_id).await
    }

    /// Find-or-create; an existing rule with the same code is returned unchanged
    pub async fn create(
        &self,
        owner_id: i32,
        request: CreateRuleRequest,
    ) -> Result<(loyalties::Model, bool), AppError> {
        let code = validate_code(&request.code)?;
        let rule_type = parse_rule_type(&request.rule_type)?;
        validate_value(request.value)?;

        let (rule, created) = self
            .store
            .create_rule(NewRule {
                owner_id,
                code,
                value: request.value,
                rule_type,
            })
            .await?;

        if created {
            info!(owner_id, code = %rule.code, rule_type = %rule.rule_type, "Loyalty rule created");
        }
        Ok((rule, created))
    }

    pub async fn update(
        &self,
        owner_id: i32,
        request: UpdateRuleRequest,
    ) -> Result<loyalties::Model, AppError> {
        let rule_type = request
            .rule_type
            .as_deref()
            .map(parse_rule_type)
            .transpose()?;
        if let Some(value) = request.value {
            validate_value(value)?;
        }

        let changes = RuleChanges {
            value: request.value,
            rule_type,
        };

        self.store
            .update_rule(owner_id, &request.code, changes)
            .await?
            .ok_or(AppError::RuleNotFound {
                owner_id,
                code: request.code,
            })
    }

    pub async fn delete(&self, owner_id: i32, code: &str) -> Result<(), AppError> {
        if self.store.delete_rule(owner_id, code).await? {
            info!(owner_id, code, "Loyalty rule deleted");
            Ok(())
        } else {
            Err(AppError::RuleNotFound {
                owner_id,
                code: code.to_string(),
            })
        }
    }
}

fn parse_rule_type(raw: &str) -> Result<LoyaltyType, AppError> {
    raw.parse()
        .map_err(|t| AppError::Validation(format!("unknown loyalty type '{}'", t)))
}

fn validate_code(code: &str) -> Result<String, AppError> {
    let code = code.trim();
    if code.is_empty() {
        return Err(AppError::Validation("code must not be empty".to_string()));
    }
    Ok(code.to_string())
}

fn validate_value(value: Decimal) -> Result<(), AppError> {
    if value.is_sign_negative() {
        return Err(AppError::Validation("value must not be negative".to_string()));
    }
    Ok(())
}
