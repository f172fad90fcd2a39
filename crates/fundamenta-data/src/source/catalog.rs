//! Candidate vendor labels for each canonical line item.
//!
//! Vendors name the same line item differently across companies and over
//! time, so each canonical metric carries an ordered candidate list and an
//! optional keyword list for the fuzzy fallback.

use serde::{Deserialize, Serialize};

/// Financial statement a line item is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statement {
    /// Income statement
    Income,
    /// Balance sheet
    BalanceSheet,
    /// Cash-flow statement
    CashFlow,
}

/// Resolution rule for one canonical metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Canonical metric name written to the table (e.g. `Revenue`)
    pub metric: String,
    /// Statement searched first
    pub statement: Statement,
    /// Vendor labels in priority order
    pub candidates: Vec<String>,
    /// Keywords for the contains-match fallback (empty disables it)
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Statement searched when nothing resolves in `statement`
    #[serde(default)]
    pub fallback_statement: Option<Statement>,
    /// Keywords used against the fallback statement
    #[serde(default)]
    pub fallback_keywords: Vec<String>,
}

impl FieldSpec {
    fn new(metric: &str, statement: Statement, candidates: &[&str], keywords: &[&str]) -> Self {
        Self {
            metric: metric.to_string(),
            statement,
            candidates: candidates.iter().map(|c| (*c).to_string()).collect(),
            keywords: keywords.iter().map(|k| (*k).to_string()).collect(),
            fallback_statement: None,
            fallback_keywords: Vec::new(),
        }
    }

    fn or_from(mut self, statement: Statement, keywords: &[&str]) -> Self {
        self.fallback_statement = Some(statement);
        self.fallback_keywords = keywords.iter().map(|k| (*k).to_string()).collect();
        self
    }
}

/// Full set of resolution rules, plus the inputs of the derived tax fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldCatalog {
    /// One rule per canonical metric
    pub fields: Vec<FieldSpec>,
    /// Pre-tax income, used to derive tax expense when no tax row resolves
    pub pretax: FieldSpec,
    /// Net income, paired with `pretax` for the derived tax fallback
    pub net_income: FieldSpec,
    /// Canonical metric that receives the derived value
    pub derived_tax_metric: String,
}

impl FieldCatalog {
    /// Rule for `metric`, if any.
    pub fn field(&self, metric: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.metric == metric)
    }

    /// Canonical metric names in catalog order.
    pub fn metrics(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.metric.as_str())
    }
}

impl Default for FieldCatalog {
    fn default() -> Self {
        use Statement::{BalanceSheet, CashFlow, Income};

        let net_income_labels = [
            "Net Income",
            "NetIncome",
            "Net Income Common Stockholders",
            "NetIncomeCommonStockholders",
            "Net Income Applicable To Common Shares",
            "NetIncomeApplicableToCommonShares",
        ];

        let fields = vec![
            FieldSpec::new(
                "Revenue",
                Income,
                &["Total Revenue", "TotalRevenue", "Revenue", "Operating Revenue", "OperatingRevenue"],
                &[],
            ),
            FieldSpec::new(
                "OperatingIncome",
                Income,
                &["Operating Income", "OperatingIncome", "Operating Income (Loss)", "OperatingIncomeLoss"],
                &[],
            ),
            FieldSpec::new("NetIncome", Income, &net_income_labels, &[]),
            FieldSpec::new(
                "CashFromOps",
                CashFlow,
                &[
                    "Operating Cash Flow",
                    "OperatingCashFlow",
                    "Total Cash From Operating Activities",
                    "Net Cash Provided by Operating Activities",
                    "NetCashProvidedByUsedInOperatingActivities",
                ],
                &[],
            ),
            FieldSpec::new(
                "EPS",
                Income,
                &["Diluted EPS", "DilutedEPS", "Basic EPS", "BasicEPS", "EPS (Diluted)", "EarningsPerShare"],
                &[],
            ),
            FieldSpec::new(
                "CashAndSTInvestments",
                BalanceSheet,
                &[
                    "Cash And Cash Equivalents",
                    "CashCashEquivalentsAndShortTermInvestments",
                    "Cash And Short Term Investments",
                ],
                &[],
            ),
            FieldSpec::new("TotalAssets", BalanceSheet, &["Total Assets", "TotalAssets"], &[]),
            FieldSpec::new(
                "TotalLiabilities",
                BalanceSheet,
                &[
                    "Total Liabilities Net Minority Interest",
                    "TotalLiabilitiesNetMinorityInterest",
                    "Total Liabilities",
                ],
                &[],
            ),
            FieldSpec::new(
                "ShortTermDebtOrCurrentLiab",
                BalanceSheet,
                &[
                    "Current Debt",
                    "CurrentDebt",
                    "Short Term Debt",
                    "ShortTermDebt",
                    "Total Current Liabilities",
                    "Current Portion Of Long Term Debt",
                ],
                &[],
            ),
            FieldSpec::new(
                "LongTermDebt",
                BalanceSheet,
                &[
                    "Long Term Debt",
                    "LongTermDebt",
                    "Non Current Debt",
                    "NonCurrentDebt",
                    "Long Term Debt And Capital Lease Obligation",
                ],
                &[],
            ),
            FieldSpec::new(
                "TotalEquity",
                BalanceSheet,
                &[
                    "Total Stockholder Equity",
                    "TotalStockholderEquity",
                    "StockholdersEquity",
                    "Total Equity Gross Minority Interest",
                    "TotalEquityGrossMinorityInterest",
                ],
                &[],
            ),
            FieldSpec::new(
                "CurrentLiabilities",
                BalanceSheet,
                &[
                    "Total Current Liabilities",
                    "TotalCurrentLiabilities",
                    "Current Liabilities",
                    "CurrentLiabilities",
                    "Current debt",
                    "Current Debt",
                    "Deposits",
                ],
                &[],
            ),
            FieldSpec::new(
                "CurrentAssets",
                BalanceSheet,
                &[
                    "Total Current Assets",
                    "TotalCurrentAssets",
                    "Current Assets",
                    "CurrentAssets",
                    "Trading Securities",
                    "Trading Assets",
                ],
                &[],
            ),
            FieldSpec::new(
                "TotalDebt",
                BalanceSheet,
                &[
                    "Total Debt",
                    "TotalDebt",
                    "Short Long Term Debt",
                    "Short Long Term Debt Total",
                    "Short/Long Term Debt",
                    "Long Term Debt",
                    "LongTermDebt",
                    "Long-term debt",
                    "Long Term Debt Noncurrent",
                ],
                &[],
            ),
            FieldSpec::new(
                "CostOfRevenue",
                Income,
                &[
                    "Cost Of Revenue",
                    "CostOfRevenue",
                    "Cost of Goods Sold",
                    "CostOfGoodsSold",
                    "Cost Of Goods And Services Sold",
                    "CostOfGoodsAndServicesSold",
                    "Cost Of Sales",
                    "CostOfSales",
                ],
                &["cost", "revenue", "sales", "cogs"],
            ),
            FieldSpec::new(
                "InterestExpense",
                Income,
                &[
                    "Interest Expense",
                    "InterestExpense",
                    "Interest Expense Non Operating",
                    "InterestExpenseNonOperating",
                    "Total Interest Expense",
                    "TotalInterestExpense",
                    "Interest And Debt Expense",
                    "InterestAndDebtExpense",
                    "Interest And Debt Expense Non Operating",
                    "InterestAndDebtExpenseNonOperating",
                    "Interest Expense Net",
                    "InterestExpenseNet",
                ],
                &["interest", "debt"],
            )
            .or_from(CashFlow, &["interest"]),
            FieldSpec::new(
                "IncomeTaxExpense",
                Income,
                &[
                    "Income Tax Expense",
                    "IncomeTaxExpense",
                    "Provision For Income Taxes",
                    "ProvisionForIncomeTaxes",
                    "Income Taxes",
                    "IncomeTaxes",
                    "Income Tax (Benefit) Expense",
                    "IncomeTaxExpenseBenefit",
                    "Income Tax Provision",
                    "IncomeTaxProvision",
                    "Tax Provision",
                    "TaxProvision",
                ],
                &["tax", "provision"],
            ),
            FieldSpec::new(
                "OtherOperatingExpense",
                Income,
                &[
                    "Operating Expense",
                    "OperatingExpense",
                    "Operating Expenses",
                    "OperatingExpenses",
                    "Other Operating Expenses",
                    "OtherOperatingExpenses",
                    "Total Operating Expenses",
                    "TotalOperatingExpenses",
                ],
                &["operating", "expense"],
            ),
            FieldSpec::new(
                "CapitalExpenditure",
                CashFlow,
                &[
                    "Capital Expenditure",
                    "CapitalExpenditure",
                    "Capital Expenditures",
                    "CapitalExpenditures",
                    "Purchase Of Property And Equipment",
                    "PurchaseOfPropertyAndEquipment",
                    "Investments In Property Plant And Equipment",
                    "InvestmentsInPropertyPlantAndEquipment",
                    "Purchase Of Fixed Assets",
                    "PurchaseOfFixedAssets",
                    "Additions To Property Plant And Equipment",
                    "AdditionsToPropertyPlantAndEquipment",
                ],
                &["capital", "property", "equipment", "purchases", "ppe"],
            ),
        ];

        Self {
            fields,
            pretax: FieldSpec::new(
                "PretaxIncome",
                Income,
                &[
                    "Pretax Income",
                    "PretaxIncome",
                    "Income Before Tax",
                    "IncomeBeforeTax",
                    "Earnings Before Tax",
                    "EarningsBeforeTax",
                    "Income Loss Before Income Taxes",
                    "IncomeLossBeforeIncomeTaxes",
                ],
                &["before tax", "pretax", "earnings before tax"],
            ),
            net_income: FieldSpec::new("NetIncome", Income, &net_income_labels, &["net income"]),
            derived_tax_metric: "IncomeTaxExpense".to_string(),
        }
    }
}
