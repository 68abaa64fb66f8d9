//! Semantic normalization engine.
//!
//! Resolution cascade for `(source_system, local_code, description)`:
//! 1. verified-mapping KB hit → `expert_verified`, confidence 1.0
//! 2. exact match against the terminology service (code equality, then
//!    canonical synonyms) → `exact`, confidence 1.0
//! 3. LLM fuzzy match, re-validated against the terminology service; a
//!    code the service does not know is rejected outright
//! 4. no client or no match → `None`; the caller keeps the local code and
//!    marks the record for review
//!
//! Expert verification writes back to the KB (superseding is audited) so
//! subsequent lookups short-circuit at step 1.

use aegis_ai::{LlmGateway, LlmRequest};
use aegis_governance::audit::{AuditCategory, AuditDraft, AuditService};
use aegis_terminology::{CodeSystem, TerminologyService, VerifiedMapping, VerifiedMappingStore};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// How a mapping was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingMethod {
    ExpertVerified,
    Exact,
    Llm,
}

/// A resolved code mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeMapping {
    pub local_code: String,
    pub local_description: String,
    pub standard_code: String,
    pub standard_system: CodeSystem,
    pub standard_description: String,
    pub confidence: f64,
    pub method: MappingMethod,
    pub source_system: String,
}

/// The normalization engine.
pub struct NormalizationEngine {
    knowledge_base: Arc<VerifiedMappingStore>,
    terminology: Arc<TerminologyService>,
    llm: Option<Arc<LlmGateway>>,
    audit: Arc<AuditService>,
}

impl NormalizationEngine {
    pub fn new(
        knowledge_base: Arc<VerifiedMappingStore>,
        terminology: Arc<TerminologyService>,
        llm: Option<Arc<LlmGateway>>,
        audit: Arc<AuditService>,
    ) -> Self {
        Self {
            knowledge_base,
            terminology,
            llm,
            audit,
        }
    }

    /// Run the cascade. `None` means the caller keeps the local code.
    pub async fn normalize(
        &self,
        source_system: &str,
        local_code: &str,
        local_description: &str,
        target_system: CodeSystem,
    ) -> Option<CodeMapping> {
        // Step 1: KB
        if let Some(verified) = self.knowledge_base.get(source_system, local_code) {
            tracing::debug!(local_code = %local_code, "Verified mapping hit");
            return Some(CodeMapping {
                local_code: local_code.to_string(),
                local_description: local_description.to_string(),
                standard_code: verified.standard_code,
                standard_system: verified.standard_system,
                standard_description: verified.standard_description,
                confidence: VerifiedMapping::CONFIDENCE,
                method: MappingMethod::ExpertVerified,
                source_system: source_system.to_string(),
            });
        }

        // Step 2: exact — the local code is already a standard code, or the
        // description matches a canonical synonym
        if let Some(concept) = self
            .terminology
            .lookup(target_system, local_code)
            .or_else(|| self.terminology.find_by_name(target_system, local_description))
        {
            return Some(CodeMapping {
                local_code: local_code.to_string(),
                local_description: local_description.to_string(),
                standard_code: concept.code,
                standard_system: concept.system,
                standard_description: concept.display,
                confidence: 1.0,
                method: MappingMethod::Exact,
                source_system: source_system.to_string(),
            });
        }

        // Step 3: LLM fuzzy
        let llm = self.llm.as_ref()?;
        self.llm_match(llm, source_system, local_code, local_description, target_system)
            .await
    }

    async fn llm_match(
        &self,
        llm: &LlmGateway,
        source_system: &str,
        local_code: &str,
        local_description: &str,
        target_system: CodeSystem,
    ) -> Option<CodeMapping> {
        let prompt = format!(
            "You are a medical terminology expert. Map this local lab code to {target}.\n\n\
             Local Code: {local_code}\n\
             Local Description: {local_description}\n\n\
             Find the best matching {target} code. Consider semantic similarity, common\n\
             abbreviations, and component synonyms.\n\n\
             Respond in JSON:\n\
             {{\"standard_code\": \"...\", \"standard_description\": \"...\", \
             \"confidence\": 0.0, \"reasoning\": \"...\"}}",
            target = target_system
        );

        let request = LlmRequest::prompt(prompt).with_max_tokens(300);
        let response = match llm.complete(&request, None).await {
            Ok(r) => r,
            Err(error) => {
                tracing::warn!(error = %error, local_code = %local_code, "LLM mapping failed");
                return None;
            }
        };

        let parsed = extract_json(&response.content)?;
        let standard_code = parsed.get("standard_code")?.as_str()?.to_string();

        // Reject codes the terminology service does not know
        if !self.terminology.validate(target_system, &standard_code) {
            tracing::warn!(
                suggested = %standard_code,
                local_code = %local_code,
                "LLM suggested a code unknown to the terminology service"
            );
            return None;
        }

        let confidence = parsed
            .get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or(0.5)
            .clamp(0.0, 1.0);

        Some(CodeMapping {
            local_code: local_code.to_string(),
            local_description: local_description.to_string(),
            standard_description: parsed
                .get("standard_description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            standard_code,
            standard_system: target_system,
            confidence,
            method: MappingMethod::Llm,
            source_system: source_system.to_string(),
        })
    }

    /// Expert feedback: persist a verification (confidence 1.0) and audit
    /// it, including any mapping it superseded.
    pub fn verify_mapping(
        &self,
        mapping: &CodeMapping,
        verified_by: &str,
        tenant_id: &str,
    ) -> VerifiedMapping {
        let verified = VerifiedMapping {
            source_system: mapping.source_system.clone(),
            local_code: mapping.local_code.clone(),
            local_description: Some(mapping.local_description.clone()),
            standard_code: mapping.standard_code.clone(),
            standard_system: mapping.standard_system,
            standard_description: mapping.standard_description.clone(),
            verified_by: verified_by.to_string(),
            verified_at: Utc::now(),
        };

        let superseded = self.knowledge_base.verify(verified.clone());
        self.audit.log(
            AuditDraft::new(
                AuditCategory::Modify,
                "verify_mapping",
                verified_by,
                tenant_id,
                "VerifiedMapping",
                format!("{}/{}", mapping.source_system, mapping.local_code),
            )
            .metadata(serde_json::json!({
                "standard_code": mapping.standard_code,
                "superseded": superseded.map(|s| s.standard_code),
            })),
        );

        verified
    }
}

/// First JSON object embedded in a model reply.
fn extract_json(content: &str) -> Option<Value> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&content[start..=end]).ok()
}
