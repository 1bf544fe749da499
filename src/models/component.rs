//! 知识组件模型
//!
//! 13 种知识组件各有独立的结构体，统一包装为 [`KnowledgeComponent`]。
//! 关系字段只保存本次运行内的内部 ID，上传时才解析成远端 ID。
//!
//! 关系表（[`ComponentKind::relations`]）同时驱动关系链接和上传顺序。

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::models::schema::{RecordSchema, ResponseSchema, ValidateRecord};

/// 知识组件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    ResearchContext,
    TheoreticalBasis,
    ResearchProblem,
    KnowledgeGap,
    ResearchQuestion,
    FutureDirection,
    PotentialApplication,
    ScientificChallenge,
    MethodologicalChallenge,
    ImplementationChallenge,
    Limitation,
    MethodologicalFramework,
    MaterialTool,
}

/// 关系字段是单值还是多值
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// 关系链接规则
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRule {
    /// 目标类型的第一个实例
    FirstInstance,
    /// 目标类型的全部实例
    AllInstances,
}

/// 一个组件类型声明的关系字段
#[derive(Debug, Clone, Copy)]
pub struct RelationSpec {
    /// JSON 字段名
    pub field: &'static str,
    pub target: ComponentKind,
    pub cardinality: Cardinality,
    pub rule: LinkRule,
}

const fn first(field: &'static str, target: ComponentKind) -> RelationSpec {
    RelationSpec {
        field,
        target,
        cardinality: Cardinality::One,
        rule: LinkRule::FirstInstance,
    }
}

const KNOWLEDGE_GAP_RELATIONS: &[RelationSpec] =
    &[first("relatedProblem", ComponentKind::ResearchProblem)];

const RESEARCH_QUESTION_RELATIONS: &[RelationSpec] = &[
    first("relatedProblem", ComponentKind::ResearchProblem),
    first("addressesGap", ComponentKind::KnowledgeGap),
];

const FUTURE_DIRECTION_RELATIONS: &[RelationSpec] = &[
    first("addressesGap", ComponentKind::KnowledgeGap),
    first("arisesFromLimitation", ComponentKind::Limitation),
    first(
        "extendsPotentialApplication",
        ComponentKind::PotentialApplication,
    ),
];

const POTENTIAL_APPLICATION_RELATIONS: &[RelationSpec] = &[RelationSpec {
    field: "buildOnMethodologicalFrameworks",
    target: ComponentKind::MethodologicalFramework,
    cardinality: Cardinality::Many,
    rule: LinkRule::AllInstances,
}];

const SCIENTIFIC_CHALLENGE_RELATIONS: &[RelationSpec] =
    &[first("relatedProblem", ComponentKind::ResearchProblem)];

const METHODOLOGICAL_CHALLENGE_RELATIONS: &[RelationSpec] = &[
    first(
        "relatedScientificChallenge",
        ComponentKind::ScientificChallenge,
    ),
    first(
        "encounteredInFramework",
        ComponentKind::MethodologicalFramework,
    ),
    first("resultsInLimitation", ComponentKind::Limitation),
];

const IMPLEMENTATION_CHALLENGE_RELATIONS: &[RelationSpec] = &[
    first("relatedApplication", ComponentKind::PotentialApplication),
    first(
        "encounteredInFramework",
        ComponentKind::MethodologicalFramework,
    ),
];

const LIMITATION_RELATIONS: &[RelationSpec] = &[first(
    "limitedFramework",
    ComponentKind::MethodologicalFramework,
)];

const FRAMEWORK_RELATIONS: &[RelationSpec] =
    &[first("researchProblem", ComponentKind::ResearchProblem)];

const MATERIAL_TOOL_RELATIONS: &[RelationSpec] = &[RelationSpec {
    field: "usedInFrameworks",
    target: ComponentKind::MethodologicalFramework,
    cardinality: Cardinality::Many,
    rule: LinkRule::FirstInstance,
}];

impl ComponentKind {
    /// 全部组件类型（默认抽取顺序）
    pub const ALL: [ComponentKind; 13] = [
        ComponentKind::ResearchContext,
        ComponentKind::TheoreticalBasis,
        ComponentKind::ResearchProblem,
        ComponentKind::KnowledgeGap,
        ComponentKind::ResearchQuestion,
        ComponentKind::FutureDirection,
        ComponentKind::PotentialApplication,
        ComponentKind::ScientificChallenge,
        ComponentKind::MethodologicalChallenge,
        ComponentKind::ImplementationChallenge,
        ComponentKind::Limitation,
        ComponentKind::MethodologicalFramework,
        ComponentKind::MaterialTool,
    ];

    /// 配置与提示词中使用的 key
    pub fn key(&self) -> &'static str {
        match self {
            ComponentKind::ResearchContext => "research_context",
            ComponentKind::TheoreticalBasis => "theoretical_basis",
            ComponentKind::ResearchProblem => "research_problem",
            ComponentKind::KnowledgeGap => "knowledge_gap",
            ComponentKind::ResearchQuestion => "research_question",
            ComponentKind::FutureDirection => "future_direction",
            ComponentKind::PotentialApplication => "potential_application",
            ComponentKind::ScientificChallenge => "scientific_challenge",
            ComponentKind::MethodologicalChallenge => "methodological_challenge",
            ComponentKind::ImplementationChallenge => "implementation_challenge",
            ComponentKind::Limitation => "limitation",
            ComponentKind::MethodologicalFramework => "methodological_framework",
            ComponentKind::MaterialTool => "material_tool",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.key() == key)
    }

    /// 日志中显示的名称
    pub fn label(&self) -> &'static str {
        match self {
            ComponentKind::ResearchContext => "研究背景",
            ComponentKind::TheoreticalBasis => "理论基础",
            ComponentKind::ResearchProblem => "研究问题",
            ComponentKind::KnowledgeGap => "知识空白",
            ComponentKind::ResearchQuestion => "研究提问",
            ComponentKind::FutureDirection => "未来方向",
            ComponentKind::PotentialApplication => "潜在应用",
            ComponentKind::ScientificChallenge => "科学挑战",
            ComponentKind::MethodologicalChallenge => "方法挑战",
            ComponentKind::ImplementationChallenge => "实施挑战",
            ComponentKind::Limitation => "局限性",
            ComponentKind::MethodologicalFramework => "方法框架",
            ComponentKind::MaterialTool => "材料工具",
        }
    }

    /// 默认 CMS slug
    pub fn default_slug(&self) -> &'static str {
        match self {
            ComponentKind::ResearchContext => "sciknow-25x1-research-contexts",
            ComponentKind::TheoreticalBasis => "sciknow-25x1-theoretical-bases",
            ComponentKind::ResearchProblem => "sciknow-25x1-research-problems",
            ComponentKind::KnowledgeGap => "sciknow-25x1-knowledge-gaps",
            ComponentKind::ResearchQuestion => "sciknow-25x1-research-questions",
            ComponentKind::FutureDirection => "sciknow-25x1-future-directions",
            ComponentKind::PotentialApplication => "sciknow-25x1-potential-applications",
            ComponentKind::ScientificChallenge => "sciknow-25x1-scientific-challenges",
            ComponentKind::MethodologicalChallenge => "sciknow-25x1-methodological-challenges",
            ComponentKind::ImplementationChallenge => "sciknow-25x1-implementation-challenges",
            ComponentKind::Limitation => "sciknow-25x1-limitations",
            ComponentKind::MethodologicalFramework => "sciknow-25x1-methodological-frameworks",
            ComponentKind::MaterialTool => "sciknow-25x1-material-tools",
        }
    }

    /// 该类型声明的关系字段（不含每个组件都有的 `paper`）
    pub fn relations(&self) -> &'static [RelationSpec] {
        match self {
            ComponentKind::KnowledgeGap => KNOWLEDGE_GAP_RELATIONS,
            ComponentKind::ResearchQuestion => RESEARCH_QUESTION_RELATIONS,
            ComponentKind::FutureDirection => FUTURE_DIRECTION_RELATIONS,
            ComponentKind::PotentialApplication => POTENTIAL_APPLICATION_RELATIONS,
            ComponentKind::ScientificChallenge => SCIENTIFIC_CHALLENGE_RELATIONS,
            ComponentKind::MethodologicalChallenge => METHODOLOGICAL_CHALLENGE_RELATIONS,
            ComponentKind::ImplementationChallenge => IMPLEMENTATION_CHALLENGE_RELATIONS,
            ComponentKind::Limitation => LIMITATION_RELATIONS,
            ComponentKind::MethodologicalFramework => FRAMEWORK_RELATIONS,
            ComponentKind::MaterialTool => MATERIAL_TOOL_RELATIONS,
            ComponentKind::ResearchContext
            | ComponentKind::TheoreticalBasis
            | ComponentKind::ResearchProblem => &[],
        }
    }

    /// 上传层级，论文为 0
    ///
    /// 每个关系字段的目标类型层级都严格小于自身层级。
    pub fn upload_tier(&self) -> u8 {
        match self {
            ComponentKind::ResearchContext | ComponentKind::TheoreticalBasis => 1,
            ComponentKind::ResearchProblem => 2,
            ComponentKind::KnowledgeGap
            | ComponentKind::ScientificChallenge
            | ComponentKind::MethodologicalFramework => 3,
            ComponentKind::ResearchQuestion
            | ComponentKind::PotentialApplication
            | ComponentKind::MaterialTool
            | ComponentKind::Limitation => 4,
            ComponentKind::MethodologicalChallenge | ComponentKind::ImplementationChallenge => 5,
            ComponentKind::FutureDirection => 6,
        }
    }

    /// 按上传顺序排列的全部类型
    pub fn in_upload_order() -> Vec<ComponentKind> {
        let mut kinds = Self::ALL.to_vec();
        kinds.sort_by_key(|k| k.upload_tier());
        kinds
    }

    /// 该类型 LLM 响应的校验 schema
    pub fn response_schema(&self) -> Box<dyn ResponseSchema> {
        match self {
            ComponentKind::ResearchContext => Box::new(RecordSchema::<ResearchContext>::new()),
            ComponentKind::TheoreticalBasis => Box::new(RecordSchema::<TheoreticalBasis>::new()),
            ComponentKind::ResearchProblem => Box::new(RecordSchema::<ResearchProblem>::new()),
            ComponentKind::KnowledgeGap => Box::new(RecordSchema::<KnowledgeGap>::new()),
            ComponentKind::ResearchQuestion => Box::new(RecordSchema::<ResearchQuestion>::new()),
            ComponentKind::FutureDirection => Box::new(RecordSchema::<FutureDirection>::new()),
            ComponentKind::PotentialApplication => {
                Box::new(RecordSchema::<PotentialApplication>::new())
            }
            ComponentKind::ScientificChallenge => {
                Box::new(RecordSchema::<ScientificChallenge>::new())
            }
            ComponentKind::MethodologicalChallenge => {
                Box::new(RecordSchema::<MethodologicalChallenge>::new())
            }
            ComponentKind::ImplementationChallenge => {
                Box::new(RecordSchema::<ImplementationChallenge>::new())
            }
            ComponentKind::Limitation => Box::new(RecordSchema::<Limitation>::new()),
            ComponentKind::MethodologicalFramework => {
                Box::new(RecordSchema::<MethodologicalFramework>::new())
            }
            ComponentKind::MaterialTool => Box::new(RecordSchema::<MaterialTool>::new()),
        }
    }
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

// ========== 公共字段 ==========

/// 所有组件共有的字段
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentBase {
    /// 运行内 ID，由程序分配
    #[serde(default, deserialize_with = "loose_id")]
    #[schemars(skip)]
    pub id: String,
    /// 所属论文的运行内 ID
    #[serde(default, deserialize_with = "loose_id")]
    #[schemars(skip)]
    pub paper: String,
    /// 抽取置信度，取值 [0, 1]
    #[serde(default)]
    pub extraction_confidence: Option<f64>,
}

impl ComponentBase {
    fn check(&self) -> Result<(), String> {
        match self.extraction_confidence {
            Some(c) if !(0.0..=1.0).contains(&c) || c.is_nan() => {
                Err(format!("extractionConfidence 超出 [0, 1]: {}", c))
            }
            _ => Ok(()),
        }
    }
}

// 列表字段允许 LLM 返回 null
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

// 以下字段由程序填写，LLM 给出的非字符串值直接忽略
fn loose_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(loose_relation(deserializer)?.unwrap_or_default())
}

fn loose_relation<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(Some(s)),
        _ => Ok(None),
    }
}

fn loose_relations<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect()),
        _ => Ok(Vec::new()),
    }
}

/// 关系字段的可变引用
pub enum RelationSlot<'a> {
    One(&'a mut Option<String>),
    Many(&'a mut Vec<String>),
}

// ========== 研究背景 ==========

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FundingSource {
    pub funder_name: String,
    pub grant_number: Option<String>,
    pub grant_title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Institution {
    pub name: String,
    pub location: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResearchContext {
    #[serde(flatten)]
    pub base: ComponentBase,
    pub discipline: Option<String>,
    pub field_of_study: Option<String>,
    pub associated_project: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub funding_sources: Vec<FundingSource>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub institutions: Vec<Institution>,
}

// ========== 理论基础 ==========

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TheoryReference {
    pub theory_name: String,
    pub originators: Option<String>,
    pub relevance: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModelReference {
    pub model_name: String,
    pub model_type: Option<String>,
    pub relevance: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TheoreticalBasis {
    #[serde(flatten)]
    pub base: ComponentBase,
    #[serde(default, deserialize_with = "null_as_default")]
    pub underlying_theories: Vec<TheoryReference>,
    pub conceptual_framework_reference: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub guiding_models: Vec<ModelReference>,
    pub philosophical_paradigm: Option<String>,
    pub school_of_thought: Option<String>,
}

// ========== 问题、空白、提问 ==========

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResearchProblem {
    #[serde(flatten)]
    pub base: ComponentBase,
    pub problem_statement: String,
    pub problem_scope: Option<String>,
    pub problem_type: Option<String>,
    pub problem_importance: Option<String>,
    pub business_relevance: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeGap {
    #[serde(flatten)]
    pub base: ComponentBase,
    pub gap_description: String,
    pub related_domain: Option<String>,
    pub gap_significance: Option<String>,
    #[serde(default, deserialize_with = "loose_relation")]
    #[schemars(skip)]
    pub related_problem: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VariableReference {
    pub variable_name: String,
    pub variable_role: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResearchQuestion {
    #[serde(flatten)]
    pub base: ComponentBase,
    pub question_text: String,
    pub question_type: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub related_variables: Vec<VariableReference>,
    #[serde(default, deserialize_with = "loose_relation")]
    #[schemars(skip)]
    pub related_problem: Option<String>,
    #[serde(default, deserialize_with = "loose_relation")]
    #[schemars(skip)]
    pub addresses_gap: Option<String>,
}

// ========== 未来方向与应用 ==========

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FutureDirection {
    #[serde(flatten)]
    pub base: ComponentBase,
    pub direction_description: String,
    pub timeframe: Option<String>,
    pub required_resources: Option<String>,
    #[serde(default, deserialize_with = "loose_relation")]
    #[schemars(skip)]
    pub addresses_gap: Option<String>,
    #[serde(default, deserialize_with = "loose_relation")]
    #[schemars(skip)]
    pub arises_from_limitation: Option<String>,
    #[serde(default, deserialize_with = "loose_relation")]
    #[schemars(skip)]
    pub extends_potential_application: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PotentialApplication {
    #[serde(flatten)]
    pub base: ComponentBase,
    pub application_description: String,
    pub target_sector: Option<String>,
    pub implementation_readiness: Option<String>,
    #[serde(default, deserialize_with = "loose_relations")]
    #[schemars(skip)]
    pub build_on_methodological_frameworks: Vec<String>,
}

// ========== 挑战与局限 ==========

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScientificChallenge {
    #[serde(flatten)]
    pub base: ComponentBase,
    pub challenge_description: String,
    pub challenge_type: Option<String>,
    pub severity: Option<String>,
    #[serde(default, deserialize_with = "loose_relation")]
    #[schemars(skip)]
    pub related_problem: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MethodologicalChallenge {
    #[serde(flatten)]
    pub base: ComponentBase,
    pub challenge_description: String,
    pub research_phase: Option<String>,
    pub mitigation_strategy: Option<String>,
    #[serde(default, deserialize_with = "loose_relation")]
    #[schemars(skip)]
    pub related_scientific_challenge: Option<String>,
    #[serde(default, deserialize_with = "loose_relation")]
    #[schemars(skip)]
    pub encountered_in_framework: Option<String>,
    #[serde(default, deserialize_with = "loose_relation")]
    #[schemars(skip)]
    pub results_in_limitation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImplementationChallenge {
    #[serde(flatten)]
    pub base: ComponentBase,
    pub challenge_description: String,
    pub resource_constraint: Option<String>,
    pub technical_hurdle: Option<String>,
    #[serde(default, deserialize_with = "loose_relation")]
    #[schemars(skip)]
    pub related_application: Option<String>,
    #[serde(default, deserialize_with = "loose_relation")]
    #[schemars(skip)]
    pub encountered_in_framework: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Limitation {
    #[serde(flatten)]
    pub base: ComponentBase,
    pub limitation_description: String,
    pub limitation_type: Option<String>,
    pub impact_on_findings: Option<String>,
    pub business_constraints: Option<String>,
    #[serde(default, deserialize_with = "loose_relation")]
    #[schemars(skip)]
    pub limited_framework: Option<String>,
}

// ========== 方法框架 ==========

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StudyDesign {
    pub design_type: String,
    pub control_group: Option<bool>,
    pub randomization: Option<bool>,
    pub blinding: Option<String>,
    pub time_dimension: Option<String>,
    pub design_details: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PopulationSampling {
    pub target_population: Option<String>,
    pub sampling_frame: Option<String>,
    pub sample_size: Option<i64>,
    pub sampling_method: Option<String>,
    pub inclusion_criteria: Option<String>,
    pub exclusion_criteria: Option<String>,
    pub response_rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    pub variable_name: String,
    pub variable_role: Option<String>,
    pub conceptual_definition: Option<String>,
    pub operationalization: Option<String>,
    pub measurement_scale: Option<String>,
    pub units: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcedureStep {
    pub step_number: Option<i64>,
    pub description: String,
    pub inputs: Option<String>,
    pub outputs: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub parameters: BTreeMap<String, Value>,
    pub control_flow: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Procedure {
    pub procedure_name: String,
    pub version: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub steps: Vec<ProcedureStep>,
    pub procedure_description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DataCollection {
    pub collection_method: Option<String>,
    pub instrument_description: Option<String>,
    pub collection_setting: Option<String>,
    pub collection_timeframe: Option<String>,
    pub data_recording_format: Option<String>,
    pub collection_procedure_details: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DataAnalysis {
    pub analysis_approach: Option<String>,
    pub statistical_tests: Option<String>,
    pub algorithms_used: Option<String>,
    pub software_details: Option<String>,
    pub parameter_settings: Option<String>,
    pub data_preprocessing_steps: Option<String>,
    pub analysis_details: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResultsRepresentation {
    pub representation_format: Option<String>,
    pub visualization_type: Option<String>,
    pub reporting_standard: Option<String>,
    pub primary_outcome_measure: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidationVerification {
    #[serde(default, deserialize_with = "null_as_default")]
    pub validation_types: Vec<String>,
    pub validation_procedure: Option<String>,
    pub validation_metrics: Option<String>,
    pub validation_results: Option<String>,
    pub industry_standards: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EthicalConsiderations {
    pub ethics_approval_body: Option<String>,
    pub approval_identifier: Option<String>,
    pub informed_consent_procedure: Option<String>,
    pub animal_welfare_compliance: Option<String>,
    pub data_anonymization: Option<bool>,
    pub privacy_measures: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReproducibilitySharing {
    pub data_availability_statement: Option<String>,
    pub data_repository: Option<String>,
    pub data_accession_number: Option<String>,
    pub code_availability_statement: Option<String>,
    pub code_repository: Option<String>,
    pub protocol_availability: Option<String>,
    pub materials_availability: Option<String>,
    pub software_environment: Option<String>,
    pub commercialization_partners: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MethodologicalFramework {
    #[serde(flatten)]
    pub base: ComponentBase,
    pub name: String,
    pub description: Option<String>,
    pub study_design: Option<StudyDesign>,
    pub population_and_sampling: Option<PopulationSampling>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub variables: Vec<Variable>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub procedures: Vec<Procedure>,
    pub data_collection: Option<DataCollection>,
    pub data_analysis: Option<DataAnalysis>,
    pub results_representation: Option<ResultsRepresentation>,
    pub validation_and_verification: Option<ValidationVerification>,
    pub ethical_considerations: Option<EthicalConsiderations>,
    pub reproducibility_and_sharing: Option<ReproducibilitySharing>,
    #[serde(default, deserialize_with = "loose_relation")]
    #[schemars(skip)]
    pub research_problem: Option<String>,
}

// ========== 材料与工具 ==========

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MaterialTool {
    #[serde(flatten)]
    pub base: ComponentBase,
    pub item_name: String,
    pub item_type: Option<String>,
    pub identifier: Option<String>,
    pub specifications: Option<String>,
    pub role_in_procedure: Option<String>,
    #[serde(default, deserialize_with = "loose_relations")]
    #[schemars(skip)]
    pub used_in_frameworks: Vec<String>,
}

// ========== 统一包装 ==========

/// 任意一种知识组件
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum KnowledgeComponent {
    ResearchContext(ResearchContext),
    TheoreticalBasis(TheoreticalBasis),
    ResearchProblem(ResearchProblem),
    KnowledgeGap(KnowledgeGap),
    ResearchQuestion(ResearchQuestion),
    FutureDirection(FutureDirection),
    PotentialApplication(PotentialApplication),
    ScientificChallenge(ScientificChallenge),
    MethodologicalChallenge(MethodologicalChallenge),
    ImplementationChallenge(ImplementationChallenge),
    Limitation(Limitation),
    MethodologicalFramework(MethodologicalFramework),
    MaterialTool(MaterialTool),
}

/// 对每个变体执行同一段表达式
macro_rules! each_variant {
    ($value:expr, $inner:ident => $body:expr) => {
        match $value {
            KnowledgeComponent::ResearchContext($inner) => $body,
            KnowledgeComponent::TheoreticalBasis($inner) => $body,
            KnowledgeComponent::ResearchProblem($inner) => $body,
            KnowledgeComponent::KnowledgeGap($inner) => $body,
            KnowledgeComponent::ResearchQuestion($inner) => $body,
            KnowledgeComponent::FutureDirection($inner) => $body,
            KnowledgeComponent::PotentialApplication($inner) => $body,
            KnowledgeComponent::ScientificChallenge($inner) => $body,
            KnowledgeComponent::MethodologicalChallenge($inner) => $body,
            KnowledgeComponent::ImplementationChallenge($inner) => $body,
            KnowledgeComponent::Limitation($inner) => $body,
            KnowledgeComponent::MethodologicalFramework($inner) => $body,
            KnowledgeComponent::MaterialTool($inner) => $body,
        }
    };
}

impl KnowledgeComponent {
    /// 按类型把一条 JSON 记录解析为组件，并做取值范围检查
    pub fn from_value(kind: ComponentKind, value: Value) -> Result<Self, String> {
        fn parse<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, String> {
            serde_json::from_value(value).map_err(|e| e.to_string())
        }

        let component = match kind {
            ComponentKind::ResearchContext => Self::ResearchContext(parse(value)?),
            ComponentKind::TheoreticalBasis => Self::TheoreticalBasis(parse(value)?),
            ComponentKind::ResearchProblem => Self::ResearchProblem(parse(value)?),
            ComponentKind::KnowledgeGap => Self::KnowledgeGap(parse(value)?),
            ComponentKind::ResearchQuestion => Self::ResearchQuestion(parse(value)?),
            ComponentKind::FutureDirection => Self::FutureDirection(parse(value)?),
            ComponentKind::PotentialApplication => Self::PotentialApplication(parse(value)?),
            ComponentKind::ScientificChallenge => Self::ScientificChallenge(parse(value)?),
            ComponentKind::MethodologicalChallenge => {
                Self::MethodologicalChallenge(parse(value)?)
            }
            ComponentKind::ImplementationChallenge => {
                Self::ImplementationChallenge(parse(value)?)
            }
            ComponentKind::Limitation => Self::Limitation(parse(value)?),
            ComponentKind::MethodologicalFramework => {
                Self::MethodologicalFramework(parse(value)?)
            }
            ComponentKind::MaterialTool => Self::MaterialTool(parse(value)?),
        };
        each_variant!(&component, c => c.check())?;
        Ok(component)
    }

    pub fn kind(&self) -> ComponentKind {
        match self {
            Self::ResearchContext(_) => ComponentKind::ResearchContext,
            Self::TheoreticalBasis(_) => ComponentKind::TheoreticalBasis,
            Self::ResearchProblem(_) => ComponentKind::ResearchProblem,
            Self::KnowledgeGap(_) => ComponentKind::KnowledgeGap,
            Self::ResearchQuestion(_) => ComponentKind::ResearchQuestion,
            Self::FutureDirection(_) => ComponentKind::FutureDirection,
            Self::PotentialApplication(_) => ComponentKind::PotentialApplication,
            Self::ScientificChallenge(_) => ComponentKind::ScientificChallenge,
            Self::MethodologicalChallenge(_) => ComponentKind::MethodologicalChallenge,
            Self::ImplementationChallenge(_) => ComponentKind::ImplementationChallenge,
            Self::Limitation(_) => ComponentKind::Limitation,
            Self::MethodologicalFramework(_) => ComponentKind::MethodologicalFramework,
            Self::MaterialTool(_) => ComponentKind::MaterialTool,
        }
    }

    pub fn base(&self) -> &ComponentBase {
        each_variant!(self, c => &c.base)
    }

    pub fn base_mut(&mut self) -> &mut ComponentBase {
        each_variant!(self, c => &mut c.base)
    }

    pub fn id(&self) -> &str {
        &self.base().id
    }

    /// 置信度（未给出时为 None）
    pub fn confidence(&self) -> Option<f64> {
        self.base().extraction_confidence
    }

    /// 按 JSON 字段名取得关系字段
    pub fn relation_slot(&mut self, field: &str) -> Option<RelationSlot<'_>> {
        use RelationSlot::{Many, One};
        match (self, field) {
            (Self::KnowledgeGap(c), "relatedProblem") => Some(One(&mut c.related_problem)),
            (Self::ResearchQuestion(c), "relatedProblem") => Some(One(&mut c.related_problem)),
            (Self::ResearchQuestion(c), "addressesGap") => Some(One(&mut c.addresses_gap)),
            (Self::FutureDirection(c), "addressesGap") => Some(One(&mut c.addresses_gap)),
            (Self::FutureDirection(c), "arisesFromLimitation") => {
                Some(One(&mut c.arises_from_limitation))
            }
            (Self::FutureDirection(c), "extendsPotentialApplication") => {
                Some(One(&mut c.extends_potential_application))
            }
            (Self::PotentialApplication(c), "buildOnMethodologicalFrameworks") => {
                Some(Many(&mut c.build_on_methodological_frameworks))
            }
            (Self::ScientificChallenge(c), "relatedProblem") => Some(One(&mut c.related_problem)),
            (Self::MethodologicalChallenge(c), "relatedScientificChallenge") => {
                Some(One(&mut c.related_scientific_challenge))
            }
            (Self::MethodologicalChallenge(c), "encounteredInFramework") => {
                Some(One(&mut c.encountered_in_framework))
            }
            (Self::MethodologicalChallenge(c), "resultsInLimitation") => {
                Some(One(&mut c.results_in_limitation))
            }
            (Self::ImplementationChallenge(c), "relatedApplication") => {
                Some(One(&mut c.related_application))
            }
            (Self::ImplementationChallenge(c), "encounteredInFramework") => {
                Some(One(&mut c.encountered_in_framework))
            }
            (Self::Limitation(c), "limitedFramework") => Some(One(&mut c.limited_framework)),
            (Self::MethodologicalFramework(c), "researchProblem") => {
                Some(One(&mut c.research_problem))
            }
            (Self::MaterialTool(c), "usedInFrameworks") => Some(Many(&mut c.used_in_frameworks)),
            _ => None,
        }
    }

    /// 序列化为 JSON 对象
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl ValidateRecord for ResearchContext {
    fn check(&self) -> Result<(), String> {
        self.base.check()
    }
}

impl ValidateRecord for TheoreticalBasis {
    fn check(&self) -> Result<(), String> {
        self.base.check()
    }
}

impl ValidateRecord for ResearchProblem {
    fn check(&self) -> Result<(), String> {
        self.base.check()
    }
}

impl ValidateRecord for KnowledgeGap {
    fn check(&self) -> Result<(), String> {
        self.base.check()
    }
}

impl ValidateRecord for ResearchQuestion {
    fn check(&self) -> Result<(), String> {
        self.base.check()
    }
}

impl ValidateRecord for FutureDirection {
    fn check(&self) -> Result<(), String> {
        self.base.check()
    }
}

impl ValidateRecord for PotentialApplication {
    fn check(&self) -> Result<(), String> {
        self.base.check()
    }
}

impl ValidateRecord for ScientificChallenge {
    fn check(&self) -> Result<(), String> {
        self.base.check()
    }
}

impl ValidateRecord for MethodologicalChallenge {
    fn check(&self) -> Result<(), String> {
        self.base.check()
    }
}

impl ValidateRecord for ImplementationChallenge {
    fn check(&self) -> Result<(), String> {
        self.base.check()
    }
}

impl ValidateRecord for Limitation {
    fn check(&self) -> Result<(), String> {
        self.base.check()
    }
}

impl ValidateRecord for MethodologicalFramework {
    fn check(&self) -> Result<(), String> {
        self.base.check()?;
        if let Some(rate) = self
            .population_and_sampling
            .as_ref()
            .and_then(|p| p.response_rate)
        {
            if rate < 0.0 {
                return Err(format!("responseRate 不能为负数: {}", rate));
            }
        }
        Ok(())
    }
}

impl ValidateRecord for MaterialTool {
    fn check(&self) -> Result<(), String> {
        self.base.check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_roundtrip() {
        for kind in ComponentKind::ALL {
            assert_eq!(ComponentKind::from_key(kind.key()), Some(kind));
        }
        assert_eq!(ComponentKind::from_key("unknown"), None);
    }

    #[test]
    fn test_every_relation_points_to_earlier_tier() {
        for kind in ComponentKind::ALL {
            assert!(kind.upload_tier() > 0);
            for rel in kind.relations() {
                assert!(
                    rel.target.upload_tier() < kind.upload_tier(),
                    "{}.{} -> {}",
                    kind,
                    rel.field,
                    rel.target
                );
            }
        }
    }

    #[test]
    fn test_every_declared_relation_has_a_slot() {
        for kind in ComponentKind::ALL {
            for rel in kind.relations() {
                let mut component = sample(kind);
                let slot = component.relation_slot(rel.field);
                match (slot, rel.cardinality) {
                    (Some(RelationSlot::One(_)), Cardinality::One) => {}
                    (Some(RelationSlot::Many(_)), Cardinality::Many) => {}
                    _ => panic!("{}.{} 没有匹配的字段", kind, rel.field),
                }
            }
        }
    }

    #[test]
    fn test_from_value_accepts_camel_case_and_defaults() {
        let component = KnowledgeComponent::from_value(
            ComponentKind::ResearchProblem,
            json!({"problemStatement": "How to scale?", "problemType": "technical"}),
        )
        .unwrap();
        assert_eq!(component.kind(), ComponentKind::ResearchProblem);
        assert_eq!(component.confidence(), None);
        assert_eq!(component.id(), "");
    }

    #[test]
    fn test_from_value_rejects_missing_required_field() {
        let err = KnowledgeComponent::from_value(
            ComponentKind::ResearchProblem,
            json!({"problemType": "technical"}),
        )
        .unwrap_err();
        assert!(err.contains("problemStatement"));
    }

    #[test]
    fn test_from_value_rejects_confidence_out_of_range() {
        let err = KnowledgeComponent::from_value(
            ComponentKind::Limitation,
            json!({"limitationDescription": "small n", "extractionConfidence": 1.5}),
        )
        .unwrap_err();
        assert!(err.contains("extractionConfidence"));
    }

    #[test]
    fn test_framework_nested_records_parse() {
        let component = KnowledgeComponent::from_value(
            ComponentKind::MethodologicalFramework,
            json!({
                "name": "RCT",
                "studyDesign": {"designType": "randomized", "controlGroup": true},
                "procedures": [{"procedureName": "p1", "steps": [
                    {"stepNumber": 1, "description": "collect", "parameters": {"k": 3}}
                ]}],
                "extractionConfidence": 0.9
            }),
        )
        .unwrap();
        match component {
            KnowledgeComponent::MethodologicalFramework(f) => {
                assert_eq!(f.study_design.unwrap().design_type, "randomized");
                assert_eq!(f.procedures[0].steps[0].parameters["k"], json!(3));
                assert_eq!(f.base.extraction_confidence, Some(0.9));
            }
            other => panic!("unexpected {:?}", other.kind()),
        }
    }

    #[test]
    fn test_serialized_component_is_flat_camel_case() {
        let mut component = sample(ComponentKind::KnowledgeGap);
        component.base_mut().id = "abc".to_string();
        if let Some(RelationSlot::One(slot)) = component.relation_slot("relatedProblem") {
            *slot = Some("p1".to_string());
        }
        let value = component.to_value();
        assert_eq!(value["id"], json!("abc"));
        assert_eq!(value["relatedProblem"], json!("p1"));
        assert!(value.get("base").is_none());
    }

    #[test]
    fn test_null_lists_parse_as_empty() {
        let component = KnowledgeComponent::from_value(
            ComponentKind::ResearchContext,
            json!({"discipline": "Agronomy", "fundingSources": null, "institutions": null}),
        )
        .unwrap();
        match component {
            KnowledgeComponent::ResearchContext(c) => {
                assert!(c.funding_sources.is_empty());
                assert!(c.institutions.is_empty());
            }
            other => panic!("unexpected {:?}", other.kind()),
        }

        let framework = KnowledgeComponent::from_value(
            ComponentKind::MethodologicalFramework,
            json!({
                "name": "Field trial",
                "variables": null,
                "procedures": [{"procedureName": "p1", "steps": [
                    {"description": "collect", "parameters": null}
                ]}],
                "validationAndVerification": {"validationTypes": null}
            }),
        );
        assert!(framework.is_ok());
    }

    #[test]
    fn test_relation_fields_ignore_non_string_values() {
        let component = KnowledgeComponent::from_value(
            ComponentKind::PotentialApplication,
            json!({
                "applicationDescription": "irrigation",
                "buildOnMethodologicalFrameworks": [3, "f1"],
                "id": 7
            }),
        )
        .unwrap();
        assert_eq!(component.id(), "");
        assert_eq!(
            component.to_value()["buildOnMethodologicalFrameworks"],
            json!(["f1"])
        );

        let gap = KnowledgeComponent::from_value(
            ComponentKind::KnowledgeGap,
            json!({"gapDescription": "g", "relatedProblem": 3}),
        )
        .unwrap();
        assert_eq!(gap.to_value()["relatedProblem"], Value::Null);
    }

    fn sample(kind: ComponentKind) -> KnowledgeComponent {
        let value = match kind {
            ComponentKind::ResearchContext => json!({}),
            ComponentKind::TheoreticalBasis => json!({}),
            ComponentKind::ResearchProblem => json!({"problemStatement": "p"}),
            ComponentKind::KnowledgeGap => json!({"gapDescription": "g"}),
            ComponentKind::ResearchQuestion => json!({"questionText": "q"}),
            ComponentKind::FutureDirection => json!({"directionDescription": "d"}),
            ComponentKind::PotentialApplication => json!({"applicationDescription": "a"}),
            ComponentKind::ScientificChallenge
            | ComponentKind::MethodologicalChallenge
            | ComponentKind::ImplementationChallenge => json!({"challengeDescription": "c"}),
            ComponentKind::Limitation => json!({"limitationDescription": "l"}),
            ComponentKind::MethodologicalFramework => json!({"name": "f"}),
            ComponentKind::MaterialTool => json!({"itemName": "m"}),
        };
        KnowledgeComponent::from_value(kind, value).unwrap()
    }
}
