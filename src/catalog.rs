// 📚 Obligation Catalog - Recurring tax obligations per month
// Static tables versioned by calendar year; a remote refresh swaps the whole Catalog

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ============================================================================
// REGIMES & CONSTANTS
// ============================================================================

pub const SIMPLES_NACIONAL: &str = "Simples Nacional";
pub const LUCRO_REAL: &str = "Lucro Real";
pub const LUCRO_PRESUMIDO: &str = "Lucro Presumido";

/// Code used by the tax authority when an obligation has no revenue code
pub const NO_CODE: &str = "N/A";

/// Provenance label for the built-in tables
pub const STATIC_SOURCE: &str = "Tabela interna";

/// First year served by the DCTFWeb edition of the static table
pub const DCTFWEB_EDITION_YEAR: i32 = 2025;

const ALL_REGIMES: &[&str] = &[LUCRO_REAL, LUCRO_PRESUMIDO, SIMPLES_NACIONAL];
const PROFIT_REGIMES: &[&str] = &[LUCRO_REAL, LUCRO_PRESUMIDO];
const SIMPLES_ONLY: &[&str] = &[SIMPLES_NACIONAL];

pub const MONTH_NAMES_PT: [&str; 12] = [
    "Janeiro", "Fevereiro", "Março", "Abril", "Maio", "Junho",
    "Julho", "Agosto", "Setembro", "Outubro", "Novembro", "Dezembro",
];

// ============================================================================
// OBLIGATION TEMPLATE
// ============================================================================

/// One recurring obligation with its nominal day-of-month
///
/// Immutable once it is part of a Catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObligationTemplate {
    pub title: String,

    /// Nominal due day (1-31); clamped to the month length at materialization
    pub due_day: u32,

    pub notes: String,

    /// Regime tags this obligation applies to; empty = every regime
    #[serde(default)]
    pub regimes: BTreeSet<String>,

    /// Revenue code (DARF code) when there is one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Assessment period, e.g. "Dezembro/2024"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,

    /// Where this entry came from (static table, remote page, ...)
    #[serde(default)]
    pub source: String,
}

impl ObligationTemplate {
    pub fn new(title: impl Into<String>, due_day: u32, notes: impl Into<String>) -> Self {
        ObligationTemplate {
            title: title.into(),
            due_day,
            notes: notes.into(),
            regimes: BTreeSet::new(),
            code: None,
            period: None,
            source: STATIC_SOURCE.to_string(),
        }
    }

    /// Builder pattern: restrict to regimes
    pub fn with_regimes(mut self, regimes: &[&str]) -> Self {
        self.regimes = regimes.iter().map(|r| r.to_string()).collect();
        self
    }

    /// Builder pattern: revenue code ("N/A" is stored as no code)
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        let code = code.into();
        self.code = if code.trim().is_empty() || code == NO_CODE {
            None
        } else {
            Some(code)
        };
        self
    }

    /// Builder pattern: assessment period
    pub fn with_period(mut self, period: impl Into<String>) -> Self {
        let period = period.into();
        self.period = if period.trim().is_empty() { None } else { Some(period) };
        self
    }

    /// Builder pattern: provenance label
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Empty regime set means "all"
    pub fn applies_to(&self, regime: &str) -> bool {
        self.regimes.is_empty() || self.regimes.contains(regime)
    }
}

// ============================================================================
// CATALOG
// ============================================================================

/// Obligations of one calendar year, grouped by month (1-12)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub year: i32,
    pub months: BTreeMap<u32, Vec<ObligationTemplate>>,
}

impl Catalog {
    pub fn new(year: i32) -> Self {
        Catalog { year, months: BTreeMap::new() }
    }

    /// Append a template to a month (ignored for months outside 1-12)
    pub fn push(&mut self, month: u32, template: ObligationTemplate) {
        if (1..=12).contains(&month) {
            self.months.entry(month).or_default().push(template);
        }
    }

    /// All templates of a month (empty slice when the month has none)
    pub fn for_month(&self, month: u32) -> &[ObligationTemplate] {
        self.months.get(&month).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Templates of a month, keeping only those applicable to `regime` when given
    pub fn filtered(&self, month: u32, regime: Option<&str>) -> Vec<ObligationTemplate> {
        self.for_month(month)
            .iter()
            .filter(|t| regime.map_or(true, |r| t.applies_to(r)))
            .cloned()
            .collect()
    }

    /// Number of months with at least one obligation
    pub fn month_count(&self) -> usize {
        self.months.values().filter(|v| !v.is_empty()).count()
    }

    pub fn obligation_count(&self) -> usize {
        self.months.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.obligation_count() == 0
    }
}

// ============================================================================
// PERIOD HELPERS
// ============================================================================

/// "Dezembro/2024" style label for a month
pub fn month_label(year: i32, month: u32) -> String {
    let name = MONTH_NAMES_PT
        .get((month as usize).wrapping_sub(1))
        .copied()
        .unwrap_or("?");
    format!("{}/{}", name, year)
}

/// Label of the month `back` months before (year, month)
fn months_back(year: i32, month: u32, back: u32) -> String {
    let index = year * 12 + month as i32 - 1 - back as i32;
    month_label(index.div_euclid(12), (index.rem_euclid(12) + 1) as u32)
}

fn annual(year: i32) -> String {
    format!("Ano-calendário {}", year - 1)
}

// ============================================================================
// STATIC TABLES
// ============================================================================

/// Hardcoded catalog for a year
///
/// Years from 2025 on use the DCTFWeb edition (regime-tagged, with codes and
/// periods); earlier years use the legacy DCTF edition.
pub fn static_catalog(year: i32) -> Catalog {
    if year >= DCTFWEB_EDITION_YEAR {
        dctfweb_edition(year)
    } else {
        legacy_edition(year)
    }
}

fn dctfweb_edition(year: i32) -> Catalog {
    let mut catalog = Catalog::new(year);

    for month in 1..=12u32 {
        let previous = months_back(year, month, 1);
        let two_back = months_back(year, month, 2);

        let monthly = vec![
            ObligationTemplate::new(
                "DCTFWeb - Declaração de Débitos e Créditos Tributários Federais",
                20,
                "Declaração de débitos e créditos federais apurados via eSocial/EFD-Reinf. Transmitir via e-CAC.",
            )
            .with_code("0561")
            .with_period(previous.clone())
            .with_regimes(ALL_REGIMES),
            ObligationTemplate::new(
                "GPS - Guia da Previdência Social (INSS)",
                20,
                "Recolhimento das contribuições previdenciárias do mês anterior.",
            )
            .with_period(previous.clone())
            .with_regimes(ALL_REGIMES),
            ObligationTemplate::new(
                "DARF - PIS/COFINS",
                25,
                "Recolhimento das contribuições PIS e COFINS do mês anterior.",
            )
            .with_code("5629")
            .with_period(previous.clone())
            .with_regimes(PROFIT_REGIMES),
            ObligationTemplate::new(
                "DARF - IRPJ e CSLL (Lucro Real/Presumido)",
                31,
                "Recolhimento do IRPJ e da CSLL. Vence no último dia do mês.",
            )
            .with_code("0180")
            .with_period(previous.clone())
            .with_regimes(PROFIT_REGIMES),
            ObligationTemplate::new(
                "DAS - Documento de Arrecadação do Simples Nacional",
                20,
                "Pagamento do Simples Nacional (ME, EPP ou MEI) via Portal do Simples Nacional.",
            )
            .with_period(previous.clone())
            .with_regimes(SIMPLES_ONLY),
            ObligationTemplate::new(
                "FGTS - Fundo de Garantia por Tempo de Serviço",
                7,
                "Recolhimento do FGTS dos empregados referente ao mês anterior.",
            )
            .with_period(previous.clone())
            .with_regimes(ALL_REGIMES),
            ObligationTemplate::new(
                "ICMS - Imposto sobre Circulação de Mercadorias e Serviços",
                15,
                "Prazo varia por estado; ajuste conforme a UF do cliente.",
            )
            .with_period(previous.clone())
            .with_regimes(ALL_REGIMES),
            ObligationTemplate::new(
                "ISS - Imposto Sobre Serviços",
                10,
                "Prazo varia por município; ajuste conforme a cidade do cliente.",
            )
            .with_period(previous.clone())
            .with_regimes(ALL_REGIMES),
            ObligationTemplate::new(
                "EFD-Contribuições - Escrituração Fiscal Digital",
                14,
                "Escrituração de PIS/COFINS e contribuição previdenciária sobre a receita.",
            )
            .with_period(two_back)
            .with_regimes(PROFIT_REGIMES),
            ObligationTemplate::new(
                "EFD-Reinf - Escrituração Fiscal Digital",
                15,
                "Escrituração das retenções e demais informações fiscais do mês anterior.",
            )
            .with_period(previous.clone())
            .with_regimes(ALL_REGIMES),
            ObligationTemplate::new(
                "DME - Declaração de Operações Liquidadas com Moeda em Espécie",
                31,
                "Obrigatória para operações em espécie acima do limite legal. Transmitir via e-CAC.",
            )
            .with_period(previous.clone())
            .with_regimes(ALL_REGIMES),
            ObligationTemplate::new(
                "DOI - Declaração sobre Operações Imobiliárias",
                31,
                "Cartórios e operações imobiliárias. Transmitir via e-CAC.",
            )
            .with_period(previous)
            .with_regimes(ALL_REGIMES),
        ];

        for template in monthly {
            catalog.push(month, template);
        }
    }

    // Annual, semiannual and quarterly filings
    let extras: Vec<(u32, ObligationTemplate)> = vec![
        (1, ObligationTemplate::new(
            "IRRF - Imposto de Renda Retido na Fonte",
            15,
            "Recolhimento do IRRF sobre fundos de investimento e demais retenções do decêndio.",
        )
        .with_code("1708")
        .with_period(format!("1º a 10/janeiro/{}", year))
        .with_regimes(PROFIT_REGIMES)),
        (2, ObligationTemplate::new(
            "DIRF - Declaração do Imposto de Renda Retido na Fonte",
            28,
            "Declaração anual das retenções do ano anterior.",
        )
        .with_period(annual(year))
        .with_regimes(ALL_REGIMES)),
        (2, ObligationTemplate::new(
            "DMED - Declaração de Serviços Médicos e de Saúde",
            28,
            "Declaração anual dos serviços médicos prestados no ano anterior.",
        )
        .with_period(annual(year))
        .with_regimes(ALL_REGIMES)),
        (2, ObligationTemplate::new(
            "DECRED - Declaração de Operações com Cartões de Crédito",
            28,
            "Declaração semestral das administradoras de cartão.",
        )
        .with_period(format!("Julho a Dezembro/{}", year - 1))
        .with_regimes(ALL_REGIMES)),
        (2, ObligationTemplate::new(
            "e-Financeira",
            28,
            "Informações financeiras semestrais das instituições obrigadas.",
        )
        .with_period(format!("Julho a Dezembro/{}", year - 1))
        .with_regimes(ALL_REGIMES)),
        (2, ObligationTemplate::new(
            "DCP - Demonstrativo do Crédito Presumido do IPI",
            15,
            "Demonstrativo trimestral do crédito presumido do IPI.",
        )
        .with_period(format!("Outubro a Dezembro/{}", year - 1))
        .with_regimes(PROFIT_REGIMES)),
        (2, ObligationTemplate::new(
            "eSocial - Eventos Periódicos",
            15,
            "Transmissão dos eventos periódicos do eSocial do mês anterior.",
        )
        .with_period(months_back(year, 2, 1))
        .with_regimes(ALL_REGIMES)),
        (3, ObligationTemplate::new(
            "DEFIS - Declaração de Informações Socioeconômicas e Fiscais",
            31,
            "Declaração anual das empresas do Simples Nacional.",
        )
        .with_period(annual(year))
        .with_regimes(SIMPLES_ONLY)),
        (3, ObligationTemplate::new(
            "RAIS - Relação Anual de Informações Sociais",
            31,
            "Declaração anual referente ao exercício anterior.",
        )
        .with_period(annual(year))
        .with_regimes(ALL_REGIMES)),
        (3, ObligationTemplate::new(
            "ECF - Escrituração Contábil Fiscal",
            31,
            "Escrituração anual referente ao exercício anterior. Transmitir via SPED.",
        )
        .with_period(annual(year))
        .with_regimes(PROFIT_REGIMES)),
        (4, ObligationTemplate::new(
            "ECD - Escrituração Contábil Digital",
            30,
            "Escrituração anual referente ao exercício anterior. Transmitir via PVA ECD.",
        )
        .with_period(annual(year))
        .with_regimes(PROFIT_REGIMES)),
        (5, ObligationTemplate::new(
            "DASN-SIMEI - Declaração Anual do Simples Nacional",
            31,
            "Declaração anual do Microempreendedor Individual.",
        )
        .with_period(annual(year))
        .with_regimes(SIMPLES_ONLY)),
        (5, ObligationTemplate::new(
            "DCP - Demonstrativo do Crédito Presumido do IPI",
            15,
            "Demonstrativo trimestral do crédito presumido do IPI.",
        )
        .with_period(format!("Janeiro a Março/{}", year))
        .with_regimes(PROFIT_REGIMES)),
        (8, ObligationTemplate::new(
            "DIRBI - Declaração de Incentivos, Renúncias, Benefícios e Imunidades",
            20,
            "Declaração dos benefícios fiscais usufruídos.",
        )
        .with_period(month_label(year, 6))
        .with_regimes(PROFIT_REGIMES)),
        (8, ObligationTemplate::new(
            "DCP - Demonstrativo do Crédito Presumido do IPI",
            15,
            "Demonstrativo trimestral do crédito presumido do IPI.",
        )
        .with_period(format!("Abril a Junho/{}", year))
        .with_regimes(PROFIT_REGIMES)),
        (8, ObligationTemplate::new(
            "DECRED - Declaração de Operações com Cartões de Crédito",
            31,
            "Declaração semestral das administradoras de cartão.",
        )
        .with_period(format!("Janeiro a Junho/{}", year))
        .with_regimes(ALL_REGIMES)),
        (8, ObligationTemplate::new(
            "e-Financeira",
            31,
            "Informações financeiras semestrais das instituições obrigadas.",
        )
        .with_period(format!("Janeiro a Junho/{}", year))
        .with_regimes(ALL_REGIMES)),
        (9, ObligationTemplate::new(
            "eSocial - Eventos Periódicos",
            15,
            "Transmissão dos eventos periódicos do eSocial do mês anterior.",
        )
        .with_period(months_back(year, 9, 1))
        .with_regimes(ALL_REGIMES)),
        (11, ObligationTemplate::new(
            "DCP - Demonstrativo do Crédito Presumido do IPI",
            15,
            "Demonstrativo trimestral do crédito presumido do IPI.",
        )
        .with_period(format!("Julho a Setembro/{}", year))
        .with_regimes(PROFIT_REGIMES)),
        (12, ObligationTemplate::new(
            "DIRPF - Declaração de Imposto de Renda Pessoa Física",
            31,
            "Pessoas físicas: início da organização da declaração anual.",
        )
        .with_period(format!("Ano-calendário {}", year))),
    ];

    for (month, template) in extras {
        catalog.push(month, template);
    }

    catalog
}

fn legacy_edition(year: i32) -> Catalog {
    let mut catalog = Catalog::new(year);

    let annual_by_month: [(&str, u32, &str); 12] = [
        ("DIRF - Declaração do Imposto de Renda Retido na Fonte", 31,
         "Declaração anual referente ao ano anterior. Transmitir via PGD no e-CAC."),
        ("RAIS - Relação Anual de Informações Sociais", 28,
         "Declaração anual referente ao exercício anterior."),
        ("ECF - Escrituração Contábil Fiscal", 31,
         "Declaração anual referente ao exercício anterior."),
        ("ECD - Escrituração Contábil Digital", 30,
         "Declaração anual referente ao exercício anterior. Transmitir via PVA ECD."),
        ("DIPJ - Declaração de Informações Econômico-Fiscais da Pessoa Jurídica", 31,
         "Declaração anual referente ao exercício anterior."),
        ("DEFIS - Declaração de Informações Socioeconômicas e Fiscais", 30,
         "Declaração anual do Simples Nacional."),
        ("EFD-Contribuições - Escrituração Fiscal Digital", 15,
         "Escrituração das contribuições PIS/COFINS do mês anterior."),
        ("DMED - Declaração de Serviços Médicos e de Saúde", 31,
         "Declaração anual dos serviços médicos prestados no exercício anterior."),
        ("eSocial - Eventos Periódicos", 15,
         "Transmissão dos eventos periódicos do eSocial referentes ao mês anterior."),
        ("GFIP - Guia de Recolhimento do FGTS", 7,
         "Informações previdenciárias e recolhimento do FGTS do mês anterior."),
        ("CAGED - Cadastro Geral de Empregados e Desempregados", 7,
         "Movimentação de empregados do mês anterior."),
        ("DIRPF - Declaração de Imposto de Renda Pessoa Física", 31,
         "Início do período de organização da declaração anual."),
    ];

    for month in 1..=12u32 {
        let previous = months_back(year, month, 1);

        catalog.push(month, ObligationTemplate::new(
            "DCTF - Declaração de Débitos e Créditos Tributários Federais",
            15,
            "Declaração referente ao mês anterior. Transmitir via PGD-DCTF no e-CAC.",
        ).with_period(previous.clone()));
        catalog.push(month, ObligationTemplate::new(
            "GPS - Guia da Previdência Social (INSS)",
            20,
            "Recolhimento das contribuições previdenciárias do mês anterior.",
        ).with_period(previous.clone()));
        catalog.push(month, ObligationTemplate::new(
            "DARF - IRPJ e CSLL (Lucro Real/Presumido)",
            31,
            "Recolhimento do IRPJ e da CSLL.",
        ).with_period(previous.clone()));
        catalog.push(month, ObligationTemplate::new(
            "DARF - PIS/COFINS",
            25,
            "Recolhimento das contribuições PIS e COFINS do mês anterior.",
        ).with_period(previous));

        let (title, due_day, notes) = annual_by_month[(month - 1) as usize];
        catalog.push(month, ObligationTemplate::new(title, due_day, notes));
    }

    catalog
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_catalog_covers_every_month() {
        for year in [2023, 2024, 2025, 2026] {
            let catalog = static_catalog(year);
            assert_eq!(catalog.year, year);
            assert_eq!(catalog.month_count(), 12, "year {} should cover 12 months", year);

            for month in 1..=12 {
                for t in catalog.for_month(month) {
                    assert!(!t.title.is_empty());
                    assert!((1..=31).contains(&t.due_day));
                    assert!(!t.notes.is_empty());
                    assert_eq!(t.source, STATIC_SOURCE);
                }
            }
        }
    }

    #[test]
    fn test_editions_by_year() {
        let legacy = static_catalog(2024);
        assert!(legacy.for_month(1).iter().any(|t| t.title.starts_with("DCTF -")));
        assert!(legacy.for_month(1).iter().all(|t| t.regimes.is_empty()));

        let modern = static_catalog(2025);
        assert!(modern.for_month(1).iter().any(|t| t.title.starts_with("DCTFWeb")));
        assert!(!modern.for_month(1).iter().any(|t| t.title.starts_with("DCTF -")));
    }

    #[test]
    fn test_regime_filter() {
        let catalog = static_catalog(2025);

        let all = catalog.filtered(12, None);
        let simples = catalog.filtered(12, Some(SIMPLES_NACIONAL));

        assert!(simples.len() < all.len());
        assert!(simples.iter().any(|t| t.title.starts_with("DAS")));
        assert!(!simples.iter().any(|t| t.title.starts_with("DARF - PIS")));

        // DIRPF has no regime tags, so it survives every filter
        assert!(simples.iter().any(|t| t.title.starts_with("DIRPF")));
        assert!(catalog
            .filtered(12, Some("Regime Inexistente"))
            .iter()
            .all(|t| t.regimes.is_empty()));
    }

    #[test]
    fn test_code_and_period_builders() {
        let t = ObligationTemplate::new("X obligation", 10, "notes")
            .with_code("N/A")
            .with_period("");
        assert_eq!(t.code, None);
        assert_eq!(t.period, None);

        let t = t.with_code("0561").with_period("Janeiro/2025");
        assert_eq!(t.code.as_deref(), Some("0561"));
        assert_eq!(t.period.as_deref(), Some("Janeiro/2025"));
    }

    #[test]
    fn test_period_labels() {
        assert_eq!(month_label(2025, 3), "Março/2025");
        assert_eq!(months_back(2025, 1, 1), "Dezembro/2024");
        assert_eq!(months_back(2025, 2, 2), "Dezembro/2024");
        assert_eq!(months_back(2025, 12, 1), "Novembro/2025");

        let jan = static_catalog(2025);
        let gps = jan
            .for_month(1)
            .iter()
            .find(|t| t.title.starts_with("GPS"))
            .unwrap();
        assert_eq!(gps.period.as_deref(), Some("Dezembro/2024"));
    }

    #[test]
    fn test_catalog_ignores_invalid_months() {
        let mut catalog = Catalog::new(2025);
        catalog.push(0, ObligationTemplate::new("Nope", 1, ""));
        catalog.push(13, ObligationTemplate::new("Nope", 1, ""));
        assert!(catalog.is_empty());
        assert!(catalog.for_month(13).is_empty());
    }
}
