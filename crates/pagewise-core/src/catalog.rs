//! Graph template catalog and keyword classifier.
//!
//! The catalog is plain data: an ordered table of templates, each with a
//! keyword set and the rendering data used by the enricher (axes, curves,
//! insight). Classification is a pure function over that table.
//!
//! # Scoring
//!
//! For every template, `score = |{ k ∈ keywords : lower(text) contains k }|`.
//! The highest score wins. On ties the template that appears first in
//! catalog order wins, so catalog order doubles as priority. A best score
//! of 0 means no classification.
//!
//! The built-in table can be replaced wholesale by a TOML file with the same
//! shape (see [`Catalog::from_toml_str`]).

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axes {
    pub x: String,
    pub y: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Curve {
    pub name: String,
    pub slope: String,
    pub meaning: String,
}

/// A hand-authored description of a recurring diagram type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphTemplate {
    pub domain: String,
    pub name: String,
    /// Display name, e.g. "Labor Market Under Monopsony".
    pub title: String,
    /// Lower-cased, de-duplicated match terms.
    pub keywords: Vec<String>,
    pub axes: Axes,
    pub curves: Vec<Curve>,
    pub insight: String,
}

impl GraphTemplate {
    /// `domain/name`, the template's stable identifier.
    pub fn id(&self) -> String {
        format!("{}/{}", self.domain, self.name)
    }

    /// Number of keywords present in already lower-cased text.
    pub fn score(&self, lowered_text: &str) -> usize {
        self.keywords
            .iter()
            .filter(|k| lowered_text.contains(k.as_str()))
            .count()
    }

    fn normalized(mut self) -> Self {
        let mut seen = Vec::with_capacity(self.keywords.len());
        for k in self.keywords {
            let k = k.trim().to_lowercase();
            if !k.is_empty() && !seen.contains(&k) {
                seen.push(k);
            }
        }
        self.keywords = seen;
        self
    }
}

/// Best-matching template for a piece of text.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub domain: String,
    pub template_name: String,
    pub template: GraphTemplate,
    pub match_score: usize,
}

/// Ordered, read-only template table.
#[derive(Debug, Clone)]
pub struct Catalog {
    templates: Vec<GraphTemplate>,
}

#[derive(Deserialize)]
struct CatalogFile {
    templates: Vec<GraphTemplate>,
}

impl Catalog {
    /// Build a catalog from templates in priority order.
    pub fn new(templates: Vec<GraphTemplate>) -> Self {
        Self {
            templates: templates.into_iter().map(GraphTemplate::normalized).collect(),
        }
    }

    /// The built-in template table.
    pub fn builtin() -> Self {
        Self::new(BUILTIN.iter().map(TemplateSpec::to_template).collect())
    }

    /// Parse a catalog from TOML (`[[templates]]` entries).
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let file: CatalogFile =
            toml::from_str(input).with_context(|| "Failed to parse template catalog")?;
        if file.templates.is_empty() {
            bail!("template catalog must define at least one template");
        }
        for t in &file.templates {
            if t.keywords.iter().all(|k| k.trim().is_empty()) {
                bail!("template '{}/{}' has no keywords", t.domain, t.name);
            }
            if t.curves.is_empty() {
                bail!("template '{}/{}' has no curves", t.domain, t.name);
            }
        }
        Ok(Self::new(file.templates))
    }

    pub fn templates(&self) -> &[GraphTemplate] {
        &self.templates
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn get(&self, domain: &str, name: &str) -> Option<&GraphTemplate> {
        self.templates
            .iter()
            .find(|t| t.domain == domain && t.name == name)
    }

    /// Score every template against `text` and return the best one.
    pub fn classify(&self, text: &str) -> Option<Classification> {
        let lowered = text.to_lowercase();
        let mut best: Option<(&GraphTemplate, usize)> = None;
        for template in &self.templates {
            let score = template.score(&lowered);
            let better = match best {
                Some((_, best_score)) => score > best_score,
                None => score > 0,
            };
            if better {
                best = Some((template, score));
            }
        }
        best.map(|(t, score)| Classification {
            domain: t.domain.clone(),
            template_name: t.name.clone(),
            template: t.clone(),
            match_score: score,
        })
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

struct TemplateSpec {
    domain: &'static str,
    name: &'static str,
    title: &'static str,
    keywords: &'static [&'static str],
    x: &'static str,
    y: &'static str,
    curves: &'static [(&'static str, &'static str, &'static str)],
    insight: &'static str,
}

impl TemplateSpec {
    fn to_template(&self) -> GraphTemplate {
        GraphTemplate {
            domain: self.domain.to_string(),
            name: self.name.to_string(),
            title: self.title.to_string(),
            keywords: self.keywords.iter().map(|k| k.to_string()).collect(),
            axes: Axes {
                x: self.x.to_string(),
                y: self.y.to_string(),
            },
            curves: self
                .curves
                .iter()
                .map(|(name, slope, meaning)| Curve {
                    name: name.to_string(),
                    slope: slope.to_string(),
                    meaning: meaning.to_string(),
                })
                .collect(),
            insight: self.insight.to_string(),
        }
    }
}

const BUILTIN: &[TemplateSpec] = &[
    TemplateSpec {
        domain: "economics",
        name: "supply-demand",
        title: "Supply and Demand Equilibrium",
        keywords: &[
            "supply and demand",
            "demand curve",
            "supply curve",
            "equilibrium price",
            "equilibrium quantity",
            "quantity demanded",
            "quantity supplied",
            "shortage",
            "surplus",
        ],
        x: "Quantity of the good (Q)",
        y: "Price (P)",
        curves: &[
            (
                "Demand (D)",
                "downward-sloping",
                "quantity buyers are willing to purchase at each price",
            ),
            (
                "Supply (S)",
                "upward-sloping",
                "quantity sellers are willing to offer at each price",
            ),
        ],
        insight: "The market clears where supply meets demand; prices above equilibrium create a surplus and prices below it a shortage.",
    },
    TemplateSpec {
        domain: "economics",
        name: "labor-market-monopsony",
        title: "Labor Market Under Monopsony",
        keywords: &[
            "monopsony",
            "monopsonist",
            "labor market",
            "marginal factor cost",
            "labor supply",
            "marginal revenue product",
            "wage rate",
            "single employer",
        ],
        x: "Quantity of labor hired (L)",
        y: "Wage rate (W)",
        curves: &[
            (
                "Labor Supply (S = AFC)",
                "upward-sloping",
                "the wage the firm must pay to attract each quantity of labor; equal to the average factor cost",
            ),
            (
                "Marginal Factor Cost (MFC)",
                "upward-sloping, steeper than and above the supply curve",
                "the extra cost of hiring one more worker, since the higher wage applies to every worker hired",
            ),
            (
                "Marginal Revenue Product (MRP = demand for labor)",
                "downward-sloping",
                "the extra revenue generated by the last worker hired",
            ),
        ],
        insight: "The monopsonist hires where MFC = MRP but pays only the wage read off the supply curve at that quantity, so both employment and wages fall below the competitive outcome.",
    },
    TemplateSpec {
        domain: "economics",
        name: "labor-market-competitive",
        title: "Perfectly Competitive Labor Market",
        keywords: &[
            "competitive labor market",
            "market wage",
            "labor demand",
            "wage taker",
            "perfectly competitive labor",
        ],
        x: "Quantity of labor (L)",
        y: "Wage rate (W)",
        curves: &[
            (
                "Market Labor Demand (D = MRP)",
                "downward-sloping",
                "sum of firms' marginal revenue products",
            ),
            (
                "Market Labor Supply (S)",
                "upward-sloping",
                "workers willing to work at each wage",
            ),
        ],
        insight: "The market wage is set where labor supply meets labor demand; each firm takes that wage as given.",
    },
    TemplateSpec {
        domain: "economics",
        name: "cost-curves",
        title: "Short-Run Cost Curves",
        keywords: &[
            "marginal cost",
            "average total cost",
            "average variable cost",
            "average fixed cost",
            "shutdown point",
            "break-even",
        ],
        x: "Quantity of output (Q)",
        y: "Cost per unit ($)",
        curves: &[
            (
                "Marginal Cost (MC)",
                "U-shaped, rising after diminishing returns set in",
                "cost of producing one more unit",
            ),
            (
                "Average Total Cost (ATC)",
                "U-shaped",
                "total cost per unit of output",
            ),
            (
                "Average Variable Cost (AVC)",
                "U-shaped, below ATC and converging toward it",
                "variable cost per unit of output",
            ),
        ],
        insight: "MC crosses both ATC and AVC at their minimum points; the minimum of AVC is the shutdown point and the minimum of ATC the break-even point.",
    },
    TemplateSpec {
        domain: "economics",
        name: "monopoly-pricing",
        title: "Monopoly Pricing",
        keywords: &[
            "monopoly",
            "monopolist",
            "marginal revenue",
            "deadweight loss",
            "price maker",
            "barriers to entry",
        ],
        x: "Quantity (Q)",
        y: "Price (P)",
        curves: &[
            ("Demand (D = AR)", "downward-sloping", "price buyers will pay for each quantity"),
            (
                "Marginal Revenue (MR)",
                "downward-sloping, twice as steep as demand",
                "extra revenue from selling one more unit",
            ),
            ("Marginal Cost (MC)", "upward-sloping", "cost of producing one more unit"),
        ],
        insight: "The monopolist produces where MR = MC and charges the price on the demand curve above that quantity, creating a deadweight loss.",
    },
    TemplateSpec {
        domain: "economics",
        name: "production-possibilities",
        title: "Production Possibilities Frontier",
        keywords: &[
            "production possibilities",
            "production possibility",
            "ppf",
            "opportunity cost",
            "attainable",
            "unattainable",
        ],
        x: "Quantity of good A",
        y: "Quantity of good B",
        curves: &[(
            "Production Possibilities Frontier (PPF)",
            "downward-sloping, bowed outward",
            "maximum combinations of two goods producible with given resources",
        )],
        insight: "Points on the frontier are efficient, points inside are attainable but inefficient, and the bowed shape reflects increasing opportunity cost.",
    },
    TemplateSpec {
        domain: "economics",
        name: "aggregate-demand-supply",
        title: "Aggregate Demand and Aggregate Supply",
        keywords: &[
            "aggregate demand",
            "aggregate supply",
            "price level",
            "real gdp",
            "long-run aggregate supply",
            "lras",
        ],
        x: "Real GDP (Y)",
        y: "Price level (P)",
        curves: &[
            ("Aggregate Demand (AD)", "downward-sloping", "total spending at each price level"),
            (
                "Short-Run Aggregate Supply (SRAS)",
                "upward-sloping",
                "output firms supply when some input prices are sticky",
            ),
            (
                "Long-Run Aggregate Supply (LRAS)",
                "vertical at potential output",
                "output when all prices have adjusted",
            ),
        ],
        insight: "Short-run equilibrium is at AD = SRAS; the economy returns to potential output on LRAS as prices adjust.",
    },
    TemplateSpec {
        domain: "economics",
        name: "phillips-curve",
        title: "Phillips Curve",
        keywords: &[
            "phillips curve",
            "inflation rate",
            "unemployment rate",
            "natural rate",
            "stagflation",
        ],
        x: "Unemployment rate (%)",
        y: "Inflation rate (%)",
        curves: &[
            (
                "Short-Run Phillips Curve (SRPC)",
                "downward-sloping",
                "short-run trade-off between inflation and unemployment",
            ),
            (
                "Long-Run Phillips Curve (LRPC)",
                "vertical at the natural rate of unemployment",
                "no long-run trade-off",
            ),
        ],
        insight: "Lower unemployment can be bought with higher inflation only in the short run; in the long run unemployment returns to its natural rate.",
    },
    TemplateSpec {
        domain: "physics",
        name: "velocity-time",
        title: "Velocity-Time Graph",
        keywords: &[
            "velocity-time",
            "velocity time",
            "acceleration",
            "velocity",
            "displacement",
            "uniform motion",
        ],
        x: "Time (t)",
        y: "Velocity (v)",
        curves: &[(
            "Velocity line",
            "slope equals acceleration",
            "how the object's velocity changes over time",
        )],
        insight: "The slope of the line is the acceleration and the area under it is the displacement.",
    },
    TemplateSpec {
        domain: "chemistry",
        name: "energy-profile",
        title: "Reaction Energy Profile",
        keywords: &[
            "activation energy",
            "reaction coordinate",
            "transition state",
            "exothermic",
            "endothermic",
            "energy profile",
            "catalyst",
        ],
        x: "Reaction coordinate (progress of reaction)",
        y: "Potential energy",
        curves: &[
            (
                "Uncatalyzed pathway",
                "rises to a peak then falls",
                "energy of the system along the reaction path",
            ),
            (
                "Catalyzed pathway",
                "lower peak than the uncatalyzed pathway",
                "alternative mechanism with lower activation energy",
            ),
        ],
        insight: "The peak height above the reactants is the activation energy; a catalyst lowers the peak without changing the overall energy change.",
    },
    TemplateSpec {
        domain: "biology",
        name: "logistic-growth",
        title: "Population Growth Curves",
        keywords: &[
            "carrying capacity",
            "logistic growth",
            "exponential growth",
            "population size",
            "growth curve",
        ],
        x: "Time",
        y: "Population size (N)",
        curves: &[
            (
                "Exponential growth (J-curve)",
                "increasingly steep",
                "growth with unlimited resources",
            ),
            (
                "Logistic growth (S-curve)",
                "steep in the middle, levelling off",
                "growth limited by resources",
            ),
        ],
        insight: "Logistic growth slows as the population approaches the carrying capacity K, while exponential growth has no ceiling.",
    },
    TemplateSpec {
        domain: "biology",
        name: "enzyme-kinetics",
        title: "Enzyme Kinetics (Michaelis-Menten)",
        keywords: &[
            "michaelis",
            "enzyme",
            "substrate concentration",
            "vmax",
            "reaction rate",
            "saturation",
        ],
        x: "Substrate concentration [S]",
        y: "Reaction rate (v)",
        curves: &[(
            "Michaelis-Menten curve",
            "rises steeply then plateaus",
            "reaction rate as the enzyme approaches saturation",
        )],
        insight: "The rate approaches Vmax as the enzyme saturates; Km is the substrate concentration giving half of Vmax.",
    },
    TemplateSpec {
        domain: "statistics",
        name: "normal-distribution",
        title: "Normal Distribution",
        keywords: &[
            "normal distribution",
            "bell curve",
            "standard deviation",
            "z-score",
            "probability density",
        ],
        x: "Value of the variable (or z-score)",
        y: "Probability density",
        curves: &[(
            "Normal density",
            "symmetric bell shape peaking at the mean",
            "relative likelihood of each value",
        )],
        insight: "About 68%, 95% and 99.7% of observations fall within one, two and three standard deviations of the mean.",
    },
];
