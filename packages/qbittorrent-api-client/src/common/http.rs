pub type ReqwestQuery = Vec<ReqwestQueryParam>;
pub type ReqwestQueryParam = (String, String);

/// URL Query component
#[derive(Default, Debug)]
pub struct Query {
    params: Vec<QueryParam>,
}

impl Query {
    #[must_use]
    pub fn empty() -> Self {
        Self { params: vec![] }
    }

    #[must_use]
    pub fn params(params: Vec<QueryParam>) -> Self {
        Self { params }
    }
}

impl From<Query> for ReqwestQuery {
    fn from(url_search_params: Query) -> Self {
        url_search_params
            .params
            .iter()
            .map(|param| ReqwestQueryParam::from((*param).clone()))
            .collect()
    }
}

/// URL query param
#[derive(Clone, Debug)]
pub struct QueryParam {
    name: String,
    value: String,
}

impl QueryParam {
    #[must_use]
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

impl From<QueryParam> for ReqwestQueryParam {
    fn from(param: QueryParam) -> Self {
        (param.name, param.value)
    }
}

#[cfg(test)]
mod tests {
    use crate::common::http::{Query, QueryParam, ReqwestQuery};

    #[test]
    fn it_should_keep_the_params_in_the_order_they_were_given() {
        let query = Query::params(vec![QueryParam::new("hash", "abc"), QueryParam::new("rid", "0")]);

        let reqwest_query: ReqwestQuery = query.into();

        assert_eq!(
            reqwest_query,
            vec![
                ("hash".to_string(), "abc".to_string()),
                ("rid".to_string(), "0".to_string())
            ]
        );
    }
}
