//! Display-name tables for backend tool and agent identifiers.
//!
//! The backend names its tools after data-vendor endpoints
//! (`fmp_balance_sheet`, `gurufocus_dcf_valuation`, ...) and its agents with
//! `*_agent` suffixes. The timeline shows human-readable labels instead;
//! anything not in the tables falls back to the raw identifier verbatim so a
//! backend addition never breaks the display.

/// The single agent whose text becomes visible message content.
pub const FINAL_SYNTHESIS_AGENT: &str = "hedge_fund_manager_agent";

/// Advisory agents whose completed output also signals end of analysis.
pub const ADVISOR_AGENTS: &[&str] = &[
    "senior_financial_advisor_agent",
    "senior_quantitative_advisor_agent",
    "senior_research_advisor_agent",
];

/// Whether `agent` is the final-synthesis agent.
pub fn is_final_synthesis(agent: &str) -> bool {
    agent == FINAL_SYNTHESIS_AGENT
}

/// Whether `agent` is one of the senior advisors.
pub fn is_advisor(agent: &str) -> bool {
    ADVISOR_AGENTS.contains(&agent)
}

/// Human-readable label for a tool name; unknown names pass through verbatim.
pub fn tool_label(name: &str) -> &str {
    match name {
        "fmp_balance_sheet" => "Balance Sheet",
        "fmp_income_statement" => "Income Statement",
        "fmp_cash_flow_statement" => "Cash Flow Statement",
        "fmp_financial_ratios" => "Financial Ratios",
        "fmp_key_metrics" => "Key Metrics",
        "fmp_key_metrics_ttm" => "Key Metrics (TTM)",
        "fmp_enterprise_value" => "Enterprise Value",
        "fmp_dcf_valuation" => "DCF Valuation",
        "gurufocus_dcf_valuation" => "DCF Valuation (GuruFocus)",
        "fmp_balance_sheet_statement_growth" => "Balance Sheet Growth",
        "fmp_cash_flow_statement_growth" => "Cash Flow Growth",
        "fmp_stock_news" => "Stock News",
        "fmp_analyst_estimates" => "Analyst Estimates",
        "fmp_price_target_summary" => "Price Target Summary",
        "fmp_historical_stock_grade" => "Historical Stock Grades",
        "fmp_relative_strength_index" => "Relative Strength Index",
        "fmp_simple_moving_average_mid" => "Simple Moving Average (mid-term)",
        "fmp_simple_moving_average_long" => "Simple Moving Average (long-term)",
        "fmp_average_directional_index" => "Average Directional Index",
        "fmp_economic_indicators" => "Economic Indicators",
        "tavily_search" => "Web Search",
        other => other,
    }
}

/// Human-readable label for an agent name; unknown names pass through verbatim.
pub fn agent_label(name: &str) -> &str {
    match name {
        "hedge_fund_manager_agent" => "Hedge Fund Manager",
        "project_manager_agent" => "Project Manager",
        "stock_researcher_agent" => "Stock Researcher",
        "web_researcher_agent" => "Web Researcher",
        "balance_sheet_agent" => "Balance Sheet Analyst",
        "income_statement_agent" => "Income Statement Analyst",
        "cash_flow_statement_agent" => "Cash Flow Analyst",
        "basic_financial_analyst_agent" => "Basic Financial Analyst",
        "technical_analyst_agent" => "Technical Analyst",
        "intrinsic_value_analyst_agent" => "Intrinsic Value Analyst",
        "growth_analyst_agent" => "Growth Analyst",
        "analyst_opinion_analyst_agent" => "Analyst Opinion Analyst",
        "economic_indiators_agent" => "Macro Economy Analyst",
        "senior_financial_advisor_agent" => "Senior Financial Advisor",
        "senior_quantitative_advisor_agent" => "Senior Quantitative Advisor",
        "senior_research_advisor_agent" => "Senior Research Advisor",
        other => other,
    }
}
