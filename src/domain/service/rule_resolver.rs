use crate::domain::entity::{normalize_function_key, normalize_key, LimitationSnapshot, Rule};

/// RuleLevel は解決されたルールがどの階層で定義されていたかを表す。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleLevel {
    Module,
    Function,
}

/// ResolvedRule は適用されるルールとその定義階層。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedRule<'a> {
    pub rule: &'a Rule,
    pub level: RuleLevel,
}

impl ResolvedRule<'_> {
    /// カウンタのファンクションキー。モジュールルールを継承した場合は
    /// モジュール単位のカウンタ（None）を共有する。
    pub fn counter_function_key(&self) -> Option<String> {
        match self.level {
            RuleLevel::Function => Some(normalize_key(&self.rule.key)),
            RuleLevel::Module => None,
        }
    }
}

/// (module_key, function_key) に適用されるルールを解決する。
///
/// 1. モジュールが無ければ None（呼び出し側で default_action を適用）
/// 2. function_key 指定時はファンクションルール、無ければモジュールルールに縮退
/// 3. function_key 未指定時はモジュールルール
pub fn resolve_rule<'a>(
    snapshot: &'a LimitationSnapshot,
    module_key: &str,
    function_key: Option<&str>,
) -> Option<ResolvedRule<'a>> {
    let module_key = normalize_key(module_key);
    let module = snapshot
        .modules
        .iter()
        .find(|m| normalize_key(&m.module_key) == module_key)?;

    let module_rule = module.module_rule.as_ref().map(|rule| ResolvedRule {
        rule,
        level: RuleLevel::Module,
    });

    match normalize_function_key(function_key) {
        Some(function_key) => module
            .function_rules
            .iter()
            .find(|r| normalize_key(&r.key) == function_key)
            .map(|rule| ResolvedRule {
                rule,
                level: RuleLevel::Function,
            })
            .or(module_rule),
        None => module_rule,
    }
}
