// Example questions offered in the sidebar.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExampleCategory {
    pub name: &'static str,
    pub questions: &'static [&'static str],
}

pub const EXAMPLE_CATEGORIES: &[ExampleCategory] = &[
    ExampleCategory {
        name: "Financial",
        questions: &[
            "Show me all bank statements with deposits greater than $10,000",
            "What was our profit in Q4 2024?",
            "Compare total revenue between Q3 and Q4 2024",
            "Show me our top 5 revenue-generating procedures",
        ],
    },
    ExampleCategory {
        name: "Vendors & Suppliers",
        questions: &[
            "List all purchase orders from Medline Industries",
            "Show me items in the supply catalog with price greater than $1900",
            "What is the payment term for Blue Cross?",
            "List all purchase order items with unit price over $1000",
        ],
    },
    ExampleCategory {
        name: "Practice Management",
        questions: &[
            "Who owns the most equity in the practice?",
            "Find all procedures covered by Aetna",
            "Show me patients with appointments next week",
            "Which doctors have the highest number of patients?",
        ],
    },
];

/// Every example as `(category, question)`, in display order.
pub fn all_examples() -> Vec<(&'static str, &'static str)> {
    EXAMPLE_CATEGORIES
        .iter()
        .flat_map(|cat| cat.questions.iter().map(move |q| (cat.name, *q)))
        .collect()
}
