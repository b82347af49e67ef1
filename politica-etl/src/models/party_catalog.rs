//! Built-in party catalog
//!
//! Registered parties as published by the electoral court (June 2025).
//! Loaded by the `seed-parties` command when no party file is at hand.

use crate::models::records::PartyRow;

const REGISTERED_PARTIES: &[(i64, &str, &str)] = &[
    (15, "MDB", "MOVIMENTO DEMOCRÁTICO BRASILEIRO"),
    (12, "PDT", "PARTIDO DEMOCRÁTICO TRABALHISTA"),
    (13, "PT", "PARTIDO DOS TRABALHADORES"),
    (65, "PCdoB", "PARTIDO COMUNISTA DO BRASIL"),
    (40, "PSB", "PARTIDO SOCIALISTA BRASILEIRO"),
    (45, "PSDB", "PARTIDO DA SOCIAL DEMOCRACIA BRASILEIRA"),
    (36, "AGIR", "AGIR"),
    (33, "MOBILIZA", "MOBILIZAÇÃO NACIONAL"),
    (23, "CIDADANIA", "CIDADANIA"),
    (43, "PV", "PARTIDO VERDE"),
    (70, "AVANTE", "AVANTE"),
    (11, "PP", "PROGRESSISTAS"),
    (16, "PSTU", "PARTIDO SOCIALISTA DOS TRABALHADORES UNIFICADO"),
    (21, "PCB", "PARTIDO COMUNISTA BRASILEIRO"),
    (28, "PRTB", "PARTIDO RENOVADOR TRABALHISTA BRASILEIRO"),
    (27, "DC", "DEMOCRACIA CRISTÃ"),
    (29, "PCO", "PARTIDO DA CAUSA OPERÁRIA"),
    (20, "PODE", "PODEMOS"),
    (10, "REPUBLICANOS", "REPUBLICANOS"),
    (50, "PSOL", "PARTIDO SOCIALISMO E LIBERDADE"),
    (22, "PL", "PARTIDO LIBERAL"),
    (55, "PSD", "PARTIDO SOCIAL DEMOCRÁTICO"),
    (77, "SOLIDARIEDADE", "SOLIDARIEDADE"),
    (30, "NOVO", "PARTIDO NOVO"),
    (18, "REDE", "REDE SUSTENTABILIDADE"),
    (35, "PMB", "PARTIDO DA MULHER BRASILEIRA"),
    (80, "UP", "UNIDADE POPULAR"),
    (44, "UNIÃO", "UNIÃO BRASIL"),
    (25, "PRD", "PARTIDO RENOVAÇÃO DEMOCRÁTICA"),
];

/// The catalog as loadable party rows
pub fn builtin_parties() -> Vec<PartyRow> {
    REGISTERED_PARTIES
        .iter()
        .map(|&(number, initials, name)| PartyRow::new(number, initials, name))
        .collect()
}
