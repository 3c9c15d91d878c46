//! Fixed vocabularies for the rule engine. Every entry is matched against
//! lower-cased, whitespace-normalized text.

use super::types::Category;

/// Category pattern sets in declaration order; the first set with a match wins.
pub const CATEGORY_PATTERNS: &[(Category, &[&str])] = &[
    (
        Category::Liability,
        &[
            r"liable\s+for\s+any\s+damages",
            r"limitation\s+of\s+liability",
            r"shall\s+not\s+be\s+liable",
            r"indemnify\s+and\s+hold\s+harmless",
            r"gross\s+negligence",
            r"consequential\s+damages",
        ],
    ),
    (
        Category::Termination,
        &[
            r"terminate\s+this\s+agreement",
            r"upon\s+termination",
            r"breach\s+of\s+contract",
            r"notice\s+of\s+termination",
            r"cure\s+period",
            r"immediate\s+termination",
        ],
    ),
    (
        Category::Payment,
        &[
            r"payment\s+terms",
            r"invoice\s+date",
            r"late\s+payment",
            r"interest\s+on\s+overdue",
            r"payment\s+schedule",
            r"net\s+\d+\s+days",
        ],
    ),
    (
        Category::IntellectualProperty,
        &[
            r"intellectual\s+property\s+rights?",
            r"proprietary\s+information",
            r"trade\s+secrets?",
            r"copyright",
            r"patent",
            r"trademark",
        ],
    ),
    (
        Category::Confidentiality,
        &[
            r"confidential\s+information",
            r"non-disclosure",
            r"proprietary\s+and\s+confidential",
            r"confidentiality\s+agreement",
            r"return\s+confidential\s+information",
        ],
    ),
    (
        Category::GoverningLaw,
        &[
            r"governed\s+by\s+the\s+laws\s+of",
            r"jurisdiction\s+and\s+venue",
            r"dispute\s+resolution",
            r"arbitration",
            r"applicable\s+law",
        ],
    ),
];

pub const HIGH_RISK_PHRASES: &[&str] = &[
    "unlimited liability",
    "personal guarantee",
    "liquidated damages",
    "punitive damages",
    "immediate termination",
    "no cure period",
    "waiver of rights",
    "hold harmless",
    "gross negligence",
];

pub const MEDIUM_RISK_PHRASES: &[&str] = &[
    "indemnification",
    "limitation of liability",
    "consequential damages",
    "termination for convenience",
    "change of control",
    "assignment",
];

pub const LOW_RISK_PHRASES: &[&str] = &[
    "standard terms",
    "mutual agreement",
    "reasonable efforts",
    "good faith",
    "commercially reasonable",
];

pub const HIGH_RISK_WEIGHT: f64 = 0.3;
pub const MEDIUM_RISK_WEIGHT: f64 = 0.2;
pub const LOW_RISK_WEIGHT: f64 = -0.1;

/// Recall filter: a sentence must contain at least one of these substrings.
pub const LEGAL_INDICATORS: &[&str] = &[
    "shall",
    "party",
    "agreement",
    "contract",
    "terms",
    "conditions",
    "liable",
    "rights",
    "obligations",
    "terminate",
    "breach",
    "indemnify",
    "warrant",
];

pub const MIN_CLAUSE_WORDS: usize = 5;

/// Subcategory keyword tables; first subcategory with a hit wins.
pub const LIABILITY_SUBCATEGORIES: &[(&str, &[&str])] = &[
    ("limitation", &["limitation of liability", "limited to"]),
    ("exclusion", &["shall not be liable", "no liability"]),
    ("indemnification", &["indemnify", "hold harmless"]),
];

pub const TERMINATION_SUBCATEGORIES: &[(&str, &[&str])] = &[
    ("for_cause", &["material breach", "for cause"]),
    ("for_convenience", &["for convenience", "without cause"]),
    ("automatic", &["automatic termination", "immediately terminate"]),
];

pub const HIGH_RISK_BANNER: &str = "⚠️ HIGH RISK: Review this clause carefully with legal counsel.";
pub const NO_RECOMMENDATIONS: &str = "No specific recommendations.";
pub const MAX_CATEGORY_ADVISORIES: usize = 2;

pub fn category_advisories(category: Category) -> &'static [&'static str] {
    match category {
        Category::Liability => &[
            "Consider adding mutual liability limitations",
            "Review indemnification scope and exclusions",
            "Ensure adequate insurance requirements",
        ],
        Category::Termination => &[
            "Verify termination notice periods are reasonable",
            "Check for adequate cure periods",
            "Review post-termination obligations",
        ],
        Category::Payment => &[
            "Confirm payment terms align with business practices",
            "Review late payment penalties",
            "Verify invoice and payment procedures",
        ],
        Category::Confidentiality => &[
            "Ensure confidentiality scope is appropriate",
            "Review return/destruction obligations",
            "Check for adequate exceptions",
        ],
        Category::IntellectualProperty | Category::GoverningLaw | Category::General => &[],
    }
}

pub const GENERAL_CONFIDENCE: f64 = 0.3;
pub const CONFIDENCE_BASE: f64 = 0.5;
